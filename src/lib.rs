// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # Camera Streamer Library
//!
//! This library provides the capture pipeline behind the camera streamer: it
//! brings a camera sensor up, keeps it recoverable when its control bus or
//! power state gets stuck, and serves captured frames as a multipart JPEG
//! stream over HTTP.
//!
//! ## Features
//!
//! - **Frame Buffer Lifecycle**: Every buffer lent by the driver is returned
//!   exactly once, enforced by the [`gate::Frame`] guard.
//! - **Bounded Acquisition**: Transient empty results from the driver are
//!   retried a bounded number of times, never forever.
//! - **Recovery**: Control bus recovery, power/reset sequencing and
//!   reinitialization with fallback configurations.
//! - **Streaming**: `multipart/x-mixed-replace` JPEG streams, with software
//!   encoding through turbojpeg for sensors delivering raw pixels.
//! - **V4L2 Integration**: Memory-mapped V4L2 capture and sensor controls.
//!
//! ## Example
//!
//! ```no_run
//! use camera_streamer::{
//!     config::{SensorConfig, Timings},
//!     recovery::{BusRecovery, PowerSequencer},
//!     session::SensorSession,
//!     v4l2::V4l2Driver,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = SensorSession::new(
//!     Box::new(V4l2Driver::new("/dev/video0")),
//!     BusRecovery::disconnected(),
//!     PowerSequencer::disconnected(),
//!     SensorConfig::default(),
//!     Timings::default(),
//! );
//! session.reinitialize()?;
//!
//! let frame = session.acquire()?;
//! println!("captured {}", *frame);
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Requirements
//!
//! - **Linux**: V4L2 capture device, optional sysfs GPIO for the control lines

pub mod args;
pub mod config;
pub mod driver;
pub mod encoder;
pub mod error;
pub mod gate;
pub mod gpio;
pub mod probe;
pub mod recovery;
pub mod server;
pub mod session;
pub mod stream;
pub mod v4l2;
