// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Sensor configuration and pipeline timing policy.

use std::{fmt, time::Duration};

/// Sensor output resolutions.
///
/// The discriminant is the index accepted by the control endpoint.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameSize {
    /// 160x120
    Qqvga,
    /// 176x144
    Qcif,
    /// 240x176
    Hqvga,
    /// 320x240
    Qvga,
    /// 352x288
    Cif,
    /// 640x480
    Vga,
    /// 800x600
    Svga,
    /// 1024x768
    Xga,
    /// 1280x1024
    Sxga,
    /// 1600x1200
    Uxga,
    /// 1280x720
    Hd,
    /// 1920x1080
    Fhd,
    /// 2048x1536
    Qxga,
    /// 2560x1440
    Qhd,
    /// 2560x1600
    Wqxga,
}

const FRAME_SIZES: [FrameSize; 15] = [
    FrameSize::Qqvga,
    FrameSize::Qcif,
    FrameSize::Hqvga,
    FrameSize::Qvga,
    FrameSize::Cif,
    FrameSize::Vga,
    FrameSize::Svga,
    FrameSize::Xga,
    FrameSize::Sxga,
    FrameSize::Uxga,
    FrameSize::Hd,
    FrameSize::Fhd,
    FrameSize::Qxga,
    FrameSize::Qhd,
    FrameSize::Wqxga,
];

impl FrameSize {
    pub fn from_index(index: usize) -> Option<Self> {
        FRAME_SIZES.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub const fn dimensions(self) -> (u32, u32) {
        match self {
            FrameSize::Qqvga => (160, 120),
            FrameSize::Qcif => (176, 144),
            FrameSize::Hqvga => (240, 176),
            FrameSize::Qvga => (320, 240),
            FrameSize::Cif => (352, 288),
            FrameSize::Vga => (640, 480),
            FrameSize::Svga => (800, 600),
            FrameSize::Xga => (1024, 768),
            FrameSize::Sxga => (1280, 1024),
            FrameSize::Uxga => (1600, 1200),
            FrameSize::Hd => (1280, 720),
            FrameSize::Fhd => (1920, 1080),
            FrameSize::Qxga => (2048, 1536),
            FrameSize::Qhd => (2560, 1440),
            FrameSize::Wqxga => (2560, 1600),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            FrameSize::Qqvga => "QQVGA",
            FrameSize::Qcif => "QCIF",
            FrameSize::Hqvga => "HQVGA",
            FrameSize::Qvga => "QVGA",
            FrameSize::Cif => "CIF",
            FrameSize::Vga => "VGA",
            FrameSize::Svga => "SVGA",
            FrameSize::Xga => "XGA",
            FrameSize::Sxga => "SXGA",
            FrameSize::Uxga => "UXGA",
            FrameSize::Hd => "HD",
            FrameSize::Fhd => "FHD",
            FrameSize::Qxga => "QXGA",
            FrameSize::Qhd => "QHD",
            FrameSize::Wqxga => "WQXGA",
        }
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "{}({}x{})", self.name(), w, h)
    }
}

/// Pixel layout of a captured frame.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Compressed JPEG, already the wire format
    Jpeg,
    /// Packed YUV 4:2:2 (Y0 U Y1 V)
    Yuyv,
    /// 24-bit RGB
    Rgb888,
    /// 16-bit RGB 5:6:5, little endian
    Rgb565,
    /// 8-bit luma only
    Grayscale,
}

impl PixelFormat {
    /// Bytes per pixel of the raw layout, `None` for compressed formats.
    pub const fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Jpeg => None,
            PixelFormat::Yuyv => Some(2),
            PixelFormat::Rgb888 => Some(3),
            PixelFormat::Rgb565 => Some(2),
            PixelFormat::Grayscale => Some(1),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            PixelFormat::Jpeg => "JPEG",
            PixelFormat::Yuyv => "YUYV",
            PixelFormat::Rgb888 => "RGB888",
            PixelFormat::Rgb565 => "RGB565",
            PixelFormat::Grayscale => "GRAY",
        };
        f.write_str(name)
    }
}

/// Memory region backing the driver's frame buffers.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferRegion {
    /// Fast internal memory
    Internal,
    /// Large external memory (PSRAM, CMA)
    External,
}

/// Control line assignments of the sensor module.
///
/// `None` marks a line that is not connected on the board.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PinMap {
    /// SCCB data line (SDA)
    pub sccb_sda: Option<u32>,
    /// SCCB clock line (SCL)
    pub sccb_scl: Option<u32>,
    /// Power-down line, active high
    pub pwdn: Option<u32>,
    /// Reset line, active low
    pub reset: Option<u32>,
    /// External clock output
    pub xclk: Option<u32>,
}

/// Everything the driver needs to bring the sensor up.
///
/// Treated as immutable once handed to initialization. Changing resolution or
/// quality means building a new value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SensorConfig {
    pub pins: PinMap,
    /// Sensor clock in Hz
    pub xclk_hz: u32,
    /// Clock used by the fallback candidates, expected to be lower
    pub fallback_xclk_hz: u32,
    pub frame_size: FrameSize,
    pub pixel_format: PixelFormat,
    /// Sensor compression quality, 0-63, lower is better
    pub quality: u8,
    /// Number of driver frame buffers
    pub fb_count: u32,
    pub fb_location: BufferRegion,
    pub gain_ctrl: bool,
    pub exposure_ctrl: bool,
    pub whitebal: bool,
    pub awb_gain: bool,
    pub hmirror: bool,
    pub vflip: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            pins: PinMap::default(),
            xclk_hz: 20_000_000,
            fallback_xclk_hz: 10_000_000,
            frame_size: FrameSize::Vga,
            pixel_format: PixelFormat::Jpeg,
            quality: 12,
            fb_count: 2,
            fb_location: BufferRegion::External,
            gain_ctrl: true,
            exposure_ctrl: true,
            whitebal: true,
            awb_gain: true,
            hmirror: false,
            vflip: false,
        }
    }
}

pub const MAX_SENSOR_QUALITY: u8 = 63;

impl SensorConfig {
    /// Ordered initialization candidates, most capable first.
    ///
    /// The requested configuration comes first, followed by configurations at
    /// the fallback clock with the buffer count halved down to one buffer.
    pub fn candidates(&self) -> Vec<SensorConfig> {
        let mut out = vec![self.clone()];
        let mut count = self.fb_count;
        loop {
            count = (count / 2).max(1);
            let next = SensorConfig {
                xclk_hz: self.fallback_xclk_hz,
                fb_count: count,
                ..self.clone()
            };
            if out.last() != Some(&next) {
                out.push(next);
            }
            if count == 1 {
                break;
            }
        }
        out
    }

    /// Codec quality (1-100, higher is better) matching the sensor quality.
    pub fn jpeg_quality(&self) -> i32 {
        jpeg_quality(self.quality)
    }
}

/// Maps sensor quality (0-63, lower is better) onto codec quality (1-100).
pub fn jpeg_quality(sensor_quality: u8) -> i32 {
    let q = sensor_quality.min(MAX_SENSOR_QUALITY) as i32;
    (100 - q * 99 / MAX_SENSOR_QUALITY as i32).clamp(1, 100)
}

/// Delays and bounds used by the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Timings {
    /// Half period of a bus recovery clock pulse
    pub bus_half_period: Duration,
    /// Settle time between power/reset line transitions
    pub power_settle: Duration,
    /// Frames captured and discarded after init
    pub warmup_frames: u32,
    pub warmup_delay: Duration,
    /// Consecutive null frames before acquisition gives up
    pub max_consecutive_nulls: u32,
    pub null_retry_delay: Duration,
    /// Acquisition bound of a readiness probe
    pub probe_attempts: u32,
    /// Pause between streamed frames
    pub stream_yield: Duration,
    /// Frames between throughput reports
    pub stats_window: u32,
    /// Longest a stream part may wait on a client that stopped reading
    pub client_stall: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            bus_half_period: Duration::from_micros(5),
            power_settle: Duration::from_millis(20),
            warmup_frames: 5,
            warmup_delay: Duration::from_millis(30),
            max_consecutive_nulls: 5,
            null_retry_delay: Duration::from_millis(10),
            probe_attempts: 3,
            stream_yield: Duration::from_millis(1),
            stats_window: 30,
            client_stall: Duration::from_secs(5),
        }
    }
}
