// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::config::{BufferRegion, FrameSize, PinMap, PixelFormat, SensorConfig, Timings};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Command-line arguments for the camera streamer.
///
/// Every option can also be given through the environment variable named
/// next to it. Arguments are read once at startup.
///
/// # Example
///
/// ```bash
/// # Via command line
/// camera-streamer --device /dev/video0 --frame-size svga --quality 10
///
/// # Via environment variables
/// export DEVICE=/dev/video0
/// export FRAME_SIZE=svga
/// camera-streamer
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Camera capture device path (e.g., /dev/video0)
    #[arg(short, long, env = "DEVICE", default_value = "/dev/video0")]
    pub device: PathBuf,

    /// HTTP listen address
    #[arg(short, long, env = "BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Sensor output resolution
    #[arg(long, env = "FRAME_SIZE", default_value = "vga", value_enum)]
    pub frame_size: FrameSize,

    /// Sensor pixel format, anything but jpeg is encoded in software
    #[arg(long, env = "PIXEL_FORMAT", default_value = "jpeg", value_enum)]
    pub pixel_format: PixelFormat,

    /// Sensor JPEG quality, 0-63, lower is better
    #[arg(
        short,
        long,
        env = "QUALITY",
        default_value = "12",
        value_parser = clap::value_parser!(u8).range(0..=63)
    )]
    pub quality: u8,

    /// Number of driver frame buffers
    #[arg(
        long,
        env = "FB_COUNT",
        default_value = "2",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub fb_count: u32,

    /// Memory region for frame buffers
    #[arg(long, env = "FB_LOCATION", default_value = "external", value_enum)]
    pub fb_location: BufferRegion,

    /// Sensor clock in Hz
    #[arg(long, env = "XCLK_HZ", default_value = "20000000")]
    pub xclk_hz: u32,

    /// Sensor clock for the fallback init attempts, in Hz
    #[arg(long, env = "FALLBACK_XCLK_HZ", default_value = "10000000")]
    pub fallback_xclk_hz: u32,

    /// GPIO of the SCCB data line, enables bus recovery with --scl-gpio
    #[arg(long, env = "SDA_GPIO")]
    pub sda_gpio: Option<u32>,

    /// GPIO of the SCCB clock line
    #[arg(long, env = "SCL_GPIO")]
    pub scl_gpio: Option<u32>,

    /// GPIO of the sensor power-down line (active high)
    #[arg(long, env = "PWDN_GPIO")]
    pub pwdn_gpio: Option<u32>,

    /// GPIO of the sensor reset line (active low)
    #[arg(long, env = "RESET_GPIO")]
    pub reset_gpio: Option<u32>,

    /// GPIO of the sensor clock output. Only logged, V4L2 platforms route
    /// the clock themselves.
    #[arg(long, env = "XCLK_GPIO")]
    pub xclk_gpio: Option<u32>,

    /// Mirror the image horizontally
    #[arg(long, env = "HMIRROR")]
    pub hmirror: bool,

    /// Flip the image vertically
    #[arg(long, env = "VFLIP")]
    pub vflip: bool,

    /// Consecutive empty frames tolerated before a stream is aborted
    #[arg(long, env = "MAX_NULL_FRAMES", default_value = "5")]
    pub max_null_frames: u32,

    /// Capture attempts of one health probe
    #[arg(long, env = "PROBE_ATTEMPTS", default_value = "3")]
    pub probe_attempts: u32,

    /// Frames captured and discarded after init
    #[arg(long, env = "WARMUP_FRAMES", default_value = "5")]
    pub warmup_frames: u32,

    /// Time one frame dequeue may take, in milliseconds
    #[arg(long, env = "FRAME_TIMEOUT_MS", default_value = "500")]
    pub frame_timeout_ms: u64,

    /// Time a stream client may stop reading before it is dropped, in
    /// milliseconds
    #[arg(long, env = "CLIENT_STALL_MS", default_value = "5000")]
    pub client_stall_ms: u64,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, env = "VERBOSE")]
    pub verbose: bool,

    /// Send logs to the systemd journal
    #[arg(long, env = "JOURNALD")]
    pub journald: bool,

    /// Enable Tokio async runtime console for debugging
    #[arg(long, env = "TOKIO_CONSOLE")]
    pub tokio_console: bool,
}

impl Args {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

impl From<&Args> for SensorConfig {
    fn from(args: &Args) -> Self {
        SensorConfig {
            pins: PinMap {
                sccb_sda: args.sda_gpio,
                sccb_scl: args.scl_gpio,
                pwdn: args.pwdn_gpio,
                reset: args.reset_gpio,
                xclk: args.xclk_gpio,
            },
            xclk_hz: args.xclk_hz,
            fallback_xclk_hz: args.fallback_xclk_hz,
            frame_size: args.frame_size,
            pixel_format: args.pixel_format,
            quality: args.quality,
            fb_count: args.fb_count,
            fb_location: args.fb_location,
            hmirror: args.hmirror,
            vflip: args.vflip,
            ..SensorConfig::default()
        }
    }
}

impl From<&Args> for Timings {
    fn from(args: &Args) -> Self {
        Timings {
            warmup_frames: args.warmup_frames,
            max_consecutive_nulls: args.max_null_frames,
            probe_attempts: args.probe_attempts,
            client_stall: Duration::from_millis(args.client_stall_ms),
            ..Timings::default()
        }
    }
}
