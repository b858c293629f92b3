// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Hardware recovery for a wedged sensor.
//!
//! A sensor that was reset mid-transaction can keep holding the SCCB data
//! line low, waiting for clock edges that never come. [`BusRecovery`] clocks
//! it out of that state, [`PowerSequencer`] power-cycles and resets the module.
//! Both are best-effort: they only improve the odds of the next init.

use crate::gpio::Line;
use std::{io, thread, time::Duration};
use tracing::{debug, info, warn};

/// Clock pulses needed to shift out one byte plus the acknowledge bit.
pub const RECOVERY_PULSES: u32 = 9;

/// Bit-banged recovery of the two-wire control bus.
///
/// Must only run while the camera driver is deinitialized, the driver owns
/// the bus otherwise.
pub struct BusRecovery {
    sda: Option<Box<dyn Line>>,
    scl: Option<Box<dyn Line>>,
    half_period: Duration,
}

impl BusRecovery {
    pub fn new(
        sda: Option<Box<dyn Line>>,
        scl: Option<Box<dyn Line>>,
        half_period: Duration,
    ) -> Self {
        Self {
            sda,
            scl,
            half_period,
        }
    }

    /// Recovery without lines, every call is a no-op.
    pub fn disconnected() -> Self {
        Self::new(None, None, Duration::ZERO)
    }

    /// Clocks the bus until the data line is released, then issues a stop.
    pub fn recover_bus(&mut self) {
        let (Some(sda), Some(scl)) = (self.sda.as_deref_mut(), self.scl.as_deref_mut()) else {
            debug!("bus recovery skipped, control lines not connected");
            return;
        };

        match clock_out(sda, scl, self.half_period) {
            Ok(pulses) => info!(pulses, "control bus recovery done"),
            Err(e) => warn!("control bus recovery aborted: {e}"),
        }

        // Always leave both lines idle, whatever happened above
        if let Err(e) = sda.release().and_then(|_| scl.release()) {
            warn!("failed to release control bus lines: {e}");
        }
    }
}

fn clock_out(sda: &mut dyn Line, scl: &mut dyn Line, half: Duration) -> io::Result<u32> {
    sda.release()?;
    scl.release()?;
    pause(half);

    let mut pulses = 0;
    while pulses < RECOVERY_PULSES && !sda.is_high()? {
        scl.drive_low()?;
        pause(half);
        scl.release()?;
        pause(half);
        pulses += 1;
    }

    if !sda.is_high()? {
        warn!(pulses, "data line still held low");
    }

    // Stop condition: data rises while clock is high
    scl.drive_low()?;
    pause(half);
    sda.drive_low()?;
    pause(half);
    scl.release()?;
    pause(half);
    sda.release()?;
    pause(half);

    Ok(pulses)
}

/// Power-down and reset sequencing of the sensor module.
pub struct PowerSequencer {
    pwdn: Option<Box<dyn Line>>,
    reset: Option<Box<dyn Line>>,
    settle: Duration,
}

impl PowerSequencer {
    pub fn new(
        pwdn: Option<Box<dyn Line>>,
        reset: Option<Box<dyn Line>>,
        settle: Duration,
    ) -> Self {
        Self {
            pwdn,
            reset,
            settle,
        }
    }

    pub fn disconnected() -> Self {
        Self::new(None, None, Duration::ZERO)
    }

    /// Pulses power-down (active high) then reset (active low).
    pub fn pulse_power_and_reset(&mut self) {
        if let Some(pwdn) = self.pwdn.as_deref_mut() {
            if let Err(e) = pulse(pwdn, true, self.settle) {
                warn!("power-down pulse failed: {e}");
            } else {
                debug!("power-down pulsed");
            }
        }
        if let Some(reset) = self.reset.as_deref_mut() {
            if let Err(e) = pulse(reset, false, self.settle) {
                warn!("reset pulse failed: {e}");
            } else {
                debug!("reset pulsed");
            }
        }
    }
}

fn pulse(line: &mut dyn Line, active_high: bool, settle: Duration) -> io::Result<()> {
    drive(line, active_high)?;
    pause(settle);
    drive(line, !active_high)?;
    pause(settle);
    Ok(())
}

fn drive(line: &mut dyn Line, high: bool) -> io::Result<()> {
    if high {
        line.drive_high()
    } else {
        line.drive_low()
    }
}

fn pause(d: Duration) {
    if !d.is_zero() {
        thread::sleep(d);
    }
}
