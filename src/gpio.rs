// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Control lines of the sensor module.

use std::{
    fs,
    io::{self, ErrorKind},
    path::PathBuf,
};
use tracing::debug;

/// A single digital line the recovery logic can drive or sample.
pub trait Line: Send {
    /// Drives the line low.
    fn drive_low(&mut self) -> io::Result<()>;

    /// Drives the line high.
    fn drive_high(&mut self) -> io::Result<()>;

    /// Stops driving the line, leaving it an input held high by its pull-up.
    fn release(&mut self) -> io::Result<()>;

    /// Samples the line level.
    fn is_high(&mut self) -> io::Result<bool>;
}

const SYSFS_GPIO: &str = "/sys/class/gpio";

/// GPIO line exposed through the kernel sysfs interface.
///
/// Releasing the line switches it to input. Pull-ups are a board property
/// under sysfs, the SCCB lines carry external ones.
#[derive(Debug)]
pub struct SysfsLine {
    gpio: u32,
    root: PathBuf,
}

impl SysfsLine {
    /// Exports `gpio` if needed and returns a handle to it.
    pub fn open(gpio: u32) -> io::Result<Self> {
        let root = PathBuf::from(SYSFS_GPIO).join(format!("gpio{gpio}"));
        if !root.exists() {
            match fs::write(PathBuf::from(SYSFS_GPIO).join("export"), gpio.to_string()) {
                Ok(()) => debug!(gpio, "gpio exported"),
                // EBUSY means another export raced us
                Err(e) if e.kind() == ErrorKind::ResourceBusy => {}
                Err(e) => return Err(e),
            }
        }
        Ok(Self { gpio, root })
    }

    pub fn gpio(&self) -> u32 {
        self.gpio
    }

    fn write(&self, attr: &str, value: &str) -> io::Result<()> {
        fs::write(self.root.join(attr), value)
    }
}

impl Line for SysfsLine {
    fn drive_low(&mut self) -> io::Result<()> {
        // "low" sets direction and level in one write, no glitch high
        self.write("direction", "low")
    }

    fn drive_high(&mut self) -> io::Result<()> {
        self.write("direction", "high")
    }

    fn release(&mut self) -> io::Result<()> {
        self.write("direction", "in")
    }

    fn is_high(&mut self) -> io::Result<bool> {
        let value = fs::read_to_string(self.root.join("value"))?;
        Ok(value.trim() == "1")
    }
}

/// Opens the line when the pin is connected.
pub fn open_line(gpio: Option<u32>) -> io::Result<Option<Box<dyn Line>>> {
    match gpio {
        Some(gpio) => Ok(Some(Box::new(SysfsLine::open(gpio)?))),
        None => Ok(None),
    }
}
