// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! V4L2 camera driver backend.
//!
//! Captures through memory-mapped V4L2 buffers and copies each dequeued frame
//! into a pooled buffer, so a lent [`FrameBuffer`] never pins a kernel buffer.
//! The number of frames on loan is still bounded by the configured buffer
//! count, matching drivers that lend their DMA buffers directly.
//!
//! The sensor clock and buffer placement are set by the device tree on V4L2
//! platforms. Both fields of [`SensorConfig`] are logged and otherwise ignored.

use crate::{
    config::{jpeg_quality, FrameSize, PixelFormat, SensorConfig},
    driver::{CameraDriver, FrameBuffer, SensorControl, SensorId},
    error::DriverError,
};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info, trace, warn};
use v4l::{
    buffer::Type,
    capability::Flags as CapFlags,
    control::{Control, Value},
    io::traits::CaptureStream,
    prelude::MmapStream,
    video::Capture,
    Device, FourCC,
};

const CID_AUTO_WHITE_BALANCE: u32 = 0x0098_090c;
const CID_AUTOGAIN: u32 = 0x0098_0912;
const CID_HFLIP: u32 = 0x0098_0914;
const CID_VFLIP: u32 = 0x0098_0915;
const CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const CID_JPEG_COMPRESSION_QUALITY: u32 = 0x009d_0903;

const EXPOSURE_MANUAL: i64 = 1;
const EXPOSURE_APERTURE_PRIORITY: i64 = 3;

/// V4L2 fourcc carrying `format`.
pub fn fourcc(format: PixelFormat) -> FourCC {
    match format {
        PixelFormat::Jpeg => FourCC::new(b"MJPG"),
        PixelFormat::Yuyv => FourCC::new(b"YUYV"),
        PixelFormat::Rgb888 => FourCC::new(b"RGB3"),
        PixelFormat::Rgb565 => FourCC::new(b"RGBP"),
        PixelFormat::Grayscale => FourCC::new(b"GREY"),
    }
}

/// Camera driver over a V4L2 capture node such as `/dev/video0`.
pub struct V4l2Driver {
    path: PathBuf,
    frame_timeout: Duration,
    device: Option<Device>,
    stream: Option<MmapStream<'static>>,
    id: SensorId,
    format: PixelFormat,
    width: u32,
    height: u32,
    fb_count: u32,
    outstanding: usize,
    next_slot: usize,
    spare: Vec<Vec<u8>>,
}

impl V4l2Driver {
    /// Creates a driver for the node at `path`. Nothing is opened until
    /// [`CameraDriver::init`].
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            frame_timeout: Duration::from_millis(500),
            device: None,
            stream: None,
            id: SensorId::default(),
            format: PixelFormat::Jpeg,
            width: 0,
            height: 0,
            fb_count: 1,
            outstanding: 0,
            next_slot: 0,
            spare: Vec::new(),
        }
    }

    /// How long one dequeue waits before reporting no frame.
    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Negotiates `size` in the current pixel format and (re)starts
    /// streaming. Capture stays stopped when negotiation fails.
    fn start(&mut self, size: FrameSize) -> Result<(), DriverError> {
        self.stream = None;
        let device = self.device.as_ref().ok_or(DriverError::NotInitialized)?;

        let (width, height) = size.dimensions();
        let wanted = fourcc(self.format);
        let mut fmt = device.format()?;
        fmt.width = width;
        fmt.height = height;
        fmt.fourcc = wanted;
        let actual = device.set_format(&fmt)?;
        if actual.fourcc != wanted {
            return Err(DriverError::Unsupported(format!(
                "{} not offered, device chose {}",
                self.format, actual.fourcc
            )));
        }
        if actual.width != width || actual.height != height {
            return Err(DriverError::Unsupported(format!(
                "{size} not offered, device chose {}x{}",
                actual.width, actual.height
            )));
        }

        let mut stream = MmapStream::with_buffers(device, Type::VideoCapture, self.fb_count)?;
        stream.set_timeout(self.frame_timeout);
        self.stream = Some(stream);
        self.width = width;
        self.height = height;
        info!(size = %size, format = %self.format, buffers = self.fb_count, "capture started");
        Ok(())
    }

    fn set_control(&self, name: &str, id: u32, value: Value) -> Result<(), DriverError> {
        let device = self.device.as_ref().ok_or(DriverError::NotInitialized)?;
        match device.set_control(Control { id, value }) {
            Ok(()) => Ok(()),
            // control not implemented by this sensor
            Err(e) if e.kind() == ErrorKind::InvalidInput => {
                debug!(control = name, "control not supported, ignored");
                Ok(())
            }
            Err(e) => Err(DriverError::Io(e)),
        }
    }
}

impl CameraDriver for V4l2Driver {
    fn init(&mut self, config: &SensorConfig) -> Result<(), DriverError> {
        self.deinit();

        let device = Device::with_path(&self.path)?;
        let caps = device.query_caps()?;
        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(DriverError::NotDetected(format!(
                "{} ({}) has no video capture",
                caps.card, caps.driver
            )));
        }
        let (major, minor, patch) = caps.version;
        self.id = SensorId {
            model: caps.card.clone(),
            driver: caps.driver.clone(),
            version: (major as u32) << 16 | (minor as u32) << 8 | patch as u32,
        };
        debug!(
            xclk_hz = config.xclk_hz,
            xclk_gpio = ?config.pins.xclk,
            fb_location = ?config.fb_location,
            "clock and buffer placement fixed by the platform"
        );

        self.device = Some(device);
        self.format = config.pixel_format;
        self.fb_count = config.fb_count.max(1);
        self.start(config.frame_size)
    }

    fn deinit(&mut self) {
        if self.device.is_some() {
            debug!(path = %self.path.display(), "closing capture device");
        }
        self.stream = None;
        self.device = None;
        self.outstanding = 0;
        self.spare.clear();
    }

    fn is_initialized(&self) -> bool {
        self.stream.is_some()
    }

    fn frame_get(&mut self) -> Option<FrameBuffer> {
        if self.outstanding >= self.fb_count as usize {
            warn!(outstanding = self.outstanding, "all frame buffers on loan");
            return None;
        }
        let stream = self.stream.as_mut()?;
        let (buf, meta) = match stream.next() {
            Ok(next) => next,
            Err(e) if e.kind() == ErrorKind::TimedOut => {
                trace!("dequeue timed out");
                return None;
            }
            Err(e) => {
                warn!("dequeue failed: {e}");
                return None;
            }
        };
        let used = (meta.bytesused as usize).min(buf.len());
        if used == 0 {
            return None;
        }
        let sequence = meta.sequence as u64;
        let timestamp = Duration::from_secs(meta.timestamp.sec.max(0) as u64)
            + Duration::from_micros(meta.timestamp.usec.max(0) as u64);

        let mut data = self.spare.pop().unwrap_or_default();
        data.clear();
        data.extend_from_slice(&buf[..used]);

        let slot = self.next_slot;
        self.next_slot = (self.next_slot + 1) % self.fb_count as usize;
        self.outstanding += 1;
        Some(FrameBuffer::new(
            slot,
            data,
            self.format,
            self.width,
            self.height,
            sequence,
            timestamp,
        ))
    }

    fn frame_return(&mut self, fb: FrameBuffer) {
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.spare.len() < self.fb_count as usize {
            self.spare.push(fb.into_data());
        }
    }

    fn sensor(&mut self) -> Option<&mut dyn SensorControl> {
        if self.device.is_some() {
            Some(self as &mut dyn SensorControl)
        } else {
            None
        }
    }
}

/// Parameters without a V4L2 counterpart (AWB gain) are accepted and ignored,
/// as are controls the sensor driver does not implement.
impl SensorControl for V4l2Driver {
    fn id(&self) -> SensorId {
        self.id.clone()
    }

    fn set_framesize(&mut self, size: FrameSize) -> Result<(), DriverError> {
        let (width, height) = size.dimensions();
        if self.stream.is_some() && self.width == width && self.height == height {
            return Ok(());
        }
        self.start(size)
    }

    fn set_quality(&mut self, quality: u8) -> Result<(), DriverError> {
        let value = Value::Integer(jpeg_quality(quality) as i64);
        self.set_control("jpeg_quality", CID_JPEG_COMPRESSION_QUALITY, value)
    }

    fn set_gain_ctrl(&mut self, enable: bool) -> Result<(), DriverError> {
        self.set_control("autogain", CID_AUTOGAIN, Value::Boolean(enable))
    }

    fn set_exposure_ctrl(&mut self, enable: bool) -> Result<(), DriverError> {
        let mode = if enable {
            EXPOSURE_APERTURE_PRIORITY
        } else {
            EXPOSURE_MANUAL
        };
        self.set_control("exposure_auto", CID_EXPOSURE_AUTO, Value::Integer(mode))
    }

    fn set_whitebal(&mut self, enable: bool) -> Result<(), DriverError> {
        self.set_control("awb", CID_AUTO_WHITE_BALANCE, Value::Boolean(enable))
    }

    fn set_awb_gain(&mut self, _enable: bool) -> Result<(), DriverError> {
        Ok(())
    }

    fn set_hmirror(&mut self, enable: bool) -> Result<(), DriverError> {
        self.set_control("hflip", CID_HFLIP, Value::Boolean(enable))
    }

    fn set_vflip(&mut self, enable: bool) -> Result<(), DriverError> {
        self.set_control("vflip", CID_VFLIP, Value::Boolean(enable))
    }
}
