// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Camera driver seam.
//!
//! A driver owns a small pool of frame buffers. [`CameraDriver::frame_get`]
//! lends one out and [`CameraDriver::frame_return`] takes it back. Callers in
//! this crate never touch these two methods directly: they go through the
//! acquisition gate, whose [`Frame`](crate::gate::Frame) guard returns the
//! buffer exactly once.

use crate::{
    config::{FrameSize, PixelFormat, SensorConfig},
    error::DriverError,
};
use std::{fmt, time::Duration};

/// One captured image, lent out by the driver.
///
/// Not `Clone`: the buffer belongs to the driver and must go back to it.
#[derive(Debug)]
pub struct FrameBuffer {
    slot: usize,
    data: Vec<u8>,
    format: PixelFormat,
    width: u32,
    height: u32,
    sequence: u64,
    timestamp: Duration,
}

impl FrameBuffer {
    /// Wraps driver memory for `slot`. Only drivers should build these.
    pub fn new(
        slot: usize,
        data: Vec<u8>,
        format: PixelFormat,
        width: u32,
        height: u32,
        sequence: u64,
        timestamp: Duration,
    ) -> Self {
        Self {
            slot,
            data,
            format,
            width,
            height,
            sequence,
            timestamp,
        }
    }

    /// Driver slot the buffer was lent from.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Capture time reported by the driver.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Gives the backing memory back to the driver for reuse.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Display for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}x{} {} {} bytes slot:{} seq:{}",
            self.width,
            self.height,
            self.format,
            self.data.len(),
            self.slot,
            self.sequence
        )
    }
}

/// Identity reported by the sensor after init.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SensorId {
    pub model: String,
    pub driver: String,
    pub version: u32,
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({}) v{:#x}", self.model, self.driver, self.version)
    }
}

/// Tunable parameters of a live sensor, one method per parameter.
///
/// Implementations that cannot honour a parameter return `Ok(())` without
/// doing anything, and say so in their docs.
pub trait SensorControl {
    fn id(&self) -> SensorId;
    fn set_framesize(&mut self, size: FrameSize) -> Result<(), DriverError>;
    fn set_quality(&mut self, quality: u8) -> Result<(), DriverError>;
    fn set_gain_ctrl(&mut self, enable: bool) -> Result<(), DriverError>;
    fn set_exposure_ctrl(&mut self, enable: bool) -> Result<(), DriverError>;
    fn set_whitebal(&mut self, enable: bool) -> Result<(), DriverError>;
    fn set_awb_gain(&mut self, enable: bool) -> Result<(), DriverError>;
    fn set_hmirror(&mut self, enable: bool) -> Result<(), DriverError>;
    fn set_vflip(&mut self, enable: bool) -> Result<(), DriverError>;
}

/// Camera driver backend.
pub trait CameraDriver: Send {
    /// Brings the driver up with `config`.
    fn init(&mut self, config: &SensorConfig) -> Result<(), DriverError>;

    /// Tears the driver down. Safe to call when not initialized.
    fn deinit(&mut self);

    fn is_initialized(&self) -> bool;

    /// Lends out the next frame, `None` when no frame is ready yet.
    fn frame_get(&mut self) -> Option<FrameBuffer>;

    /// Takes back a frame lent by [`CameraDriver::frame_get`].
    fn frame_return(&mut self, fb: FrameBuffer);

    /// Live sensor handle, `None` when not initialized.
    fn sensor(&mut self) -> Option<&mut dyn SensorControl>;
}
