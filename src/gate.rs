// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame acquisition gate.
//!
//! Drivers sometimes have no frame ready and answer with nothing. That is
//! retried here, a bounded number of times, so callers either get a frame or
//! a definite [`AcquireError::Empty`] and never spin forever.

use crate::{driver::CameraDriver, driver::FrameBuffer, error::AcquireError};
use std::{fmt, ops::Deref, thread, time::Duration};
use tracing::{debug, trace, warn};

/// Retry bound for null results from the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcquirePolicy {
    /// Consecutive null results that end the acquisition
    pub max_nulls: u32,
    pub retry_delay: Duration,
}

/// A frame on loan from the driver.
///
/// The buffer goes back to the driver when the `Frame` is dropped or
/// [`released`](Frame::release), exactly once on every path. The mutable
/// borrow of the driver keeps anything else from using it meanwhile.
pub struct Frame<'a> {
    fb: Option<FrameBuffer>,
    driver: &'a mut dyn CameraDriver,
    nulls: u32,
}

impl Frame<'_> {
    /// Null results absorbed before this frame arrived.
    pub fn nulls(&self) -> u32 {
        self.nulls
    }

    /// Returns the buffer to the driver now.
    pub fn release(self) {
        drop(self)
    }
}

impl Deref for Frame<'_> {
    type Target = FrameBuffer;

    fn deref(&self) -> &FrameBuffer {
        match &self.fb {
            Some(fb) => fb,
            None => unreachable!("frame buffer used after release"),
        }
    }
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        if let Some(fb) = self.fb.take() {
            trace!(slot = fb.slot(), seq = fb.sequence(), "frame returned");
            self.driver.frame_return(fb);
        }
    }
}

impl fmt::Debug for Frame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Frame")
            .field("fb", &self.fb)
            .field("nulls", &self.nulls)
            .finish()
    }
}

/// Gets the next frame from `driver`, retrying null results up to the bound.
pub fn acquire<'a>(
    driver: &'a mut dyn CameraDriver,
    policy: &AcquirePolicy,
) -> Result<Frame<'a>, AcquireError> {
    if !driver.is_initialized() {
        return Err(AcquireError::NotInitialized);
    }

    let attempts = policy.max_nulls.max(1);
    for attempt in 1..=attempts {
        if let Some(fb) = driver.frame_get() {
            let nulls = attempt - 1;
            if nulls > 0 {
                debug!(nulls, "frame arrived after null results");
            }
            return Ok(Frame {
                fb: Some(fb),
                driver,
                nulls,
            });
        }
        warn!(attempt, bound = attempts, "driver returned no frame");
        if attempt < attempts && !policy.retry_delay.is_zero() {
            thread::sleep(policy.retry_delay);
        }
    }

    Err(AcquireError::Empty { attempts })
}
