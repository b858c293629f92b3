// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Error taxonomy for the capture pipeline.
//!
//! Transient conditions (a driver momentarily without a frame) never leave the
//! acquisition gate. Everything else ends the current unit of work, one stream
//! session or one init attempt, and is reported to the caller as a value.

use crate::config::PixelFormat;
use std::{io, time::Duration};

/// Failure reported by a camera driver backend.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The device answered but does not look like a capture device.
    #[error("sensor not detected: {0}")]
    NotDetected(String),

    /// The driver refused the requested format or parameter.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The operation needs an initialized driver.
    #[error("driver not initialized")]
    NotInitialized,

    /// Device I/O failed (ioctl, mmap, open).
    #[error("device I/O: {0}")]
    Io(#[from] io::Error),
}

/// Initialization failed for every configuration candidate.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("no configuration candidates to try")]
    NoCandidates,

    #[error("sensor init failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: DriverError,
    },
}

/// Acquisition did not produce a frame.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AcquireError {
    /// The consecutive-null bound was reached.
    #[error("no frame after {attempts} attempts")]
    Empty { attempts: u32 },

    /// A reinitialization is in progress.
    #[error("pipeline is recovering")]
    Recovering,

    /// The driver is not initialized.
    #[error("pipeline not initialized")]
    NotInitialized,
}

/// Converting a raw frame to JPEG failed.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("cannot encode pixel format {0}")]
    UnsupportedFormat(PixelFormat),

    #[error("frame holds {actual} bytes, {expected} needed for {width}x{height}")]
    Truncated {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("{format} needs an even width, got {width}")]
    OddWidth { format: PixelFormat, width: u32 },

    #[error("jpeg codec: {0}")]
    Codec(#[from] turbojpeg::Error),
}

/// Writing to the client failed or the client is gone.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("peer disconnected")]
    Disconnected,

    #[error("client stopped reading for {0:?}")]
    Stalled(Duration),

    #[error("write failed: {0}")]
    Io(#[from] io::Error),
}

/// A single-frame capture failed.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}
