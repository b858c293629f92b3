// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Sensor session: owns the driver, the active configuration and the
//! pipeline state, and is the only place that brings the sensor up or down.

use crate::{
    config::{FrameSize, SensorConfig, Timings, MAX_SENSOR_QUALITY},
    driver::{CameraDriver, SensorControl},
    error::{AcquireError, DriverError, InitError},
    gate::{self, AcquirePolicy, Frame},
    recovery::{BusRecovery, PowerSequencer},
};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    thread,
};
use tracing::{debug, error, info, instrument, warn};

/// Health of the capture pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    /// Acquisition is expected to succeed
    Ready,
    /// Init failed or the last readiness probe failed
    Degraded,
    /// A reinitialization is running, acquisition is refused
    Recovering,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => PipelineState::Ready,
            2 => PipelineState::Degraded,
            3 => PipelineState::Recovering,
            _ => PipelineState::Uninitialized,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            PipelineState::Uninitialized => 0,
            PipelineState::Ready => 1,
            PipelineState::Degraded => 2,
            PipelineState::Recovering => 3,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::Ready => "ready",
            PipelineState::Degraded => "degraded",
            PipelineState::Recovering => "recovering",
        };
        f.write_str(name)
    }
}

/// Shared view of the pipeline state.
///
/// Readable without holding the session lock, so handlers can refuse work
/// while a recovery holds it. Only the session writes it.
#[derive(Clone, Debug)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new(state: PipelineState) -> Self {
        Self(Arc::new(AtomicU8::new(state.as_u8())))
    }

    pub fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: PipelineState) {
        let prev = PipelineState::from_u8(self.0.swap(state.as_u8(), Ordering::AcqRel));
        if prev != state {
            debug!(%prev, next = %state, "pipeline state changed");
        }
    }
}

/// Leaves the state Degraded if a recovery unwinds without finishing.
struct RecoveringGuard<'a>(&'a StateCell);

impl Drop for RecoveringGuard<'_> {
    fn drop(&mut self) {
        if self.0.get() == PipelineState::Recovering {
            self.0.set(PipelineState::Degraded);
        }
    }
}

/// A live parameter change requested from outside.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    FrameSize(FrameSize),
    Quality(u8),
}

impl ControlCommand {
    /// Parses the `var`/`val` pair of the control endpoint.
    pub fn parse(var: &str, val: &str) -> Option<Self> {
        let val: usize = val.trim().parse().ok()?;
        match var {
            "framesize" => FrameSize::from_index(val).map(ControlCommand::FrameSize),
            "quality" if val <= MAX_SENSOR_QUALITY as usize => {
                Some(ControlCommand::Quality(val as u8))
            }
            _ => None,
        }
    }
}

/// Owner of the camera driver and everything needed to (re)start it.
pub struct SensorSession {
    driver: Box<dyn CameraDriver>,
    bus: BusRecovery,
    power: PowerSequencer,
    requested: SensorConfig,
    active: Option<SensorConfig>,
    state: StateCell,
    timings: Timings,
}

impl SensorSession {
    pub fn new(
        driver: Box<dyn CameraDriver>,
        bus: BusRecovery,
        power: PowerSequencer,
        config: SensorConfig,
        timings: Timings,
    ) -> Self {
        Self {
            driver,
            bus,
            power,
            requested: config,
            active: None,
            state: StateCell::new(PipelineState::Uninitialized),
            timings,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    pub fn state_cell(&self) -> StateCell {
        self.state.clone()
    }

    /// Configuration used for the next (re)initialization.
    pub fn requested_config(&self) -> &SensorConfig {
        &self.requested
    }

    /// Configuration the driver is running with, if initialized.
    pub fn active_config(&self) -> Option<&SensorConfig> {
        self.active.as_ref()
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Codec quality for software encoding of raw frames.
    pub fn jpeg_quality(&self) -> i32 {
        self.active
            .as_ref()
            .unwrap_or(&self.requested)
            .jpeg_quality()
    }

    /// Brings the sensor up, trying `config` and then its fallbacks in order.
    ///
    /// On success the sensor parameters are re-applied, the pipeline is warmed
    /// up and the state becomes Ready. When every candidate fails the state
    /// becomes Degraded; retrying is left to the caller.
    #[instrument(skip_all, fields(frame_size = %config.frame_size, fb_count = config.fb_count))]
    pub fn initialize(&mut self, config: SensorConfig) -> Result<&SensorConfig, InitError> {
        let candidates = config.candidates();
        self.requested = config;
        self.active = None;

        let mut last = None;
        for (attempt, candidate) in candidates.iter().enumerate() {
            info!(
                attempt = attempt + 1,
                xclk_hz = candidate.xclk_hz,
                fb_count = candidate.fb_count,
                fb_location = ?candidate.fb_location,
                "initializing camera"
            );
            match self.driver.init(candidate) {
                Ok(()) => {
                    self.active = Some(candidate.clone());
                    break;
                }
                Err(e) => {
                    error!(attempt = attempt + 1, "camera init failed: {e}");
                    // a half-initialized driver must not leak into the next try
                    self.driver.deinit();
                    last = Some(e);
                }
            }
        }

        let Some(active) = self.active.clone() else {
            self.state.set(PipelineState::Degraded);
            return Err(match last {
                Some(last) => InitError::Exhausted {
                    attempts: candidates.len(),
                    last,
                },
                None => InitError::NoCandidates,
            });
        };

        self.apply_sensor_params(&active);
        self.warm_up();
        self.state.set(PipelineState::Ready);
        info!("camera ready");
        Ok(self.active.as_ref().unwrap_or(&self.requested))
    }

    /// Full recovery: deinit, bus recovery, power/reset pulse, initialize.
    ///
    /// The state is Recovering for the duration and ends Ready or Degraded.
    #[instrument(skip_all)]
    pub fn reinitialize(&mut self) -> Result<(), InitError> {
        let cell = self.state.clone();
        let _guard = RecoveringGuard(&cell);
        cell.set(PipelineState::Recovering);
        warn!("reinitializing camera");

        self.driver.deinit();
        self.active = None;
        self.bus.recover_bus();
        self.power.pulse_power_and_reset();

        let config = self.requested.clone();
        self.initialize(config).map(|_| ())
    }

    /// Acquires a frame through the gate with the stream retry bound.
    pub fn acquire(&mut self) -> Result<Frame<'_>, AcquireError> {
        let policy = AcquirePolicy {
            max_nulls: self.timings.max_consecutive_nulls,
            retry_delay: self.timings.null_retry_delay,
        };
        self.acquire_with(&policy)
    }

    /// Acquires a frame with an explicit retry bound.
    pub fn acquire_with(&mut self, policy: &AcquirePolicy) -> Result<Frame<'_>, AcquireError> {
        match self.state.get() {
            PipelineState::Recovering => return Err(AcquireError::Recovering),
            PipelineState::Uninitialized => return Err(AcquireError::NotInitialized),
            PipelineState::Ready | PipelineState::Degraded => {}
        }
        gate::acquire(self.driver.as_mut(), policy)
    }

    /// Records the outcome of a readiness probe.
    pub fn record_probe(&mut self, ok: bool) {
        match (self.state.get(), ok) {
            (PipelineState::Degraded, true) if self.driver.is_initialized() => {
                info!("probe succeeded, pipeline ready");
                self.state.set(PipelineState::Ready);
            }
            (PipelineState::Ready, false) => {
                warn!("probe failed, pipeline degraded");
                self.state.set(PipelineState::Degraded);
            }
            _ => {}
        }
    }

    /// Applies a parameter change to the live sensor and remembers it for
    /// the next initialization.
    pub fn apply_control(&mut self, command: ControlCommand) -> Result<(), DriverError> {
        if self.state.get() == PipelineState::Recovering {
            return Err(DriverError::NotInitialized);
        }
        let sensor = self.driver.sensor().ok_or(DriverError::NotInitialized)?;
        match command {
            ControlCommand::FrameSize(size) => {
                if let Err(e) = sensor.set_framesize(size) {
                    self.restore_frame_size();
                    return Err(e);
                }
                self.requested.frame_size = size;
                if let Some(active) = self.active.as_mut() {
                    active.frame_size = size;
                }
            }
            ControlCommand::Quality(quality) => {
                sensor.set_quality(quality)?;
                self.requested.quality = quality;
                if let Some(active) = self.active.as_mut() {
                    active.quality = quality;
                }
            }
        }
        info!(?command, "sensor parameter applied");
        Ok(())
    }

    /// Restarts capture at the running frame size after a rejected change
    /// stopped it. The pipeline is Degraded if that fails too.
    fn restore_frame_size(&mut self) {
        if self.driver.is_initialized() {
            return;
        }
        let previous = self
            .active
            .as_ref()
            .map_or(self.requested.frame_size, |active| active.frame_size);
        warn!(size = %previous, "frame size change stopped capture, restoring");
        let restored = match self.driver.sensor() {
            Some(sensor) => sensor.set_framesize(previous),
            None => Err(DriverError::NotInitialized),
        };
        match restored {
            Ok(()) if self.driver.is_initialized() => {
                info!(size = %previous, "capture restored");
            }
            Ok(()) => {
                error!("capture still stopped after restore");
                self.state.set(PipelineState::Degraded);
            }
            Err(e) => {
                error!("cannot restore frame size: {e}");
                self.state.set(PipelineState::Degraded);
            }
        }
    }

    /// Some sensors ignore parts of the init configuration, so every tunable
    /// is set again on the live handle.
    fn apply_sensor_params(&mut self, config: &SensorConfig) {
        let Some(sensor) = self.driver.sensor() else {
            error!("no sensor handle after init");
            return;
        };
        info!(sensor = %sensor.id(), "sensor detected");
        apply(sensor, "framesize", |s| s.set_framesize(config.frame_size));
        apply(sensor, "quality", |s| s.set_quality(config.quality));
        apply(sensor, "gain_ctrl", |s| s.set_gain_ctrl(config.gain_ctrl));
        apply(sensor, "exposure_ctrl", |s| {
            s.set_exposure_ctrl(config.exposure_ctrl)
        });
        apply(sensor, "whitebal", |s| s.set_whitebal(config.whitebal));
        apply(sensor, "awb_gain", |s| s.set_awb_gain(config.awb_gain));
        apply(sensor, "hmirror", |s| s.set_hmirror(config.hmirror));
        apply(sensor, "vflip", |s| s.set_vflip(config.vflip));
    }

    /// Captures and discards frames so the first streamed frame has settled
    /// exposure and white balance.
    fn warm_up(&mut self) {
        let mut captured = 0;
        for _ in 0..self.timings.warmup_frames {
            if let Some(fb) = self.driver.frame_get() {
                self.driver.frame_return(fb);
                captured += 1;
            }
            if !self.timings.warmup_delay.is_zero() {
                thread::sleep(self.timings.warmup_delay);
            }
        }
        info!(
            captured,
            requested = self.timings.warmup_frames,
            "camera warm-up complete"
        );
    }
}

fn apply<F>(sensor: &mut dyn SensorControl, name: &str, set: F)
where
    F: FnOnce(&mut dyn SensorControl) -> Result<(), DriverError>,
{
    if let Err(e) = set(sensor) {
        warn!(param = name, "failed to apply sensor parameter: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{driver::FrameBuffer, gate::AcquirePolicy};
    use std::time::Duration;

    /// Claims to stream but never has a frame.
    struct IdleDriver;

    impl CameraDriver for IdleDriver {
        fn init(&mut self, _config: &SensorConfig) -> Result<(), DriverError> {
            Ok(())
        }

        fn deinit(&mut self) {}

        fn is_initialized(&self) -> bool {
            true
        }

        fn frame_get(&mut self) -> Option<FrameBuffer> {
            None
        }

        fn frame_return(&mut self, _fb: FrameBuffer) {}

        fn sensor(&mut self) -> Option<&mut dyn SensorControl> {
            None
        }
    }

    #[test]
    fn recovering_refuses_acquisition() {
        let mut session = SensorSession::new(
            Box::new(IdleDriver),
            BusRecovery::disconnected(),
            PowerSequencer::disconnected(),
            SensorConfig::default(),
            Timings::default(),
        );
        session.state.set(PipelineState::Recovering);

        let policy = AcquirePolicy {
            max_nulls: 3,
            retry_delay: Duration::ZERO,
        };
        assert!(matches!(
            session.acquire_with(&policy).map(|f| f.len()),
            Err(AcquireError::Recovering)
        ));
        assert!(matches!(
            session.acquire().map(|f| f.len()),
            Err(AcquireError::Recovering)
        ));
        assert!(session
            .apply_control(ControlCommand::Quality(10))
            .is_err());
    }

    #[test]
    fn control_parsing() {
        assert_eq!(
            ControlCommand::parse("framesize", "5"),
            Some(ControlCommand::FrameSize(FrameSize::Vga))
        );
        assert_eq!(
            ControlCommand::parse("quality", "10"),
            Some(ControlCommand::Quality(10))
        );
        assert_eq!(ControlCommand::parse("quality", "64"), None);
        assert_eq!(ControlCommand::parse("framesize", "99"), None);
        assert_eq!(ControlCommand::parse("brightness", "1"), None);
        assert_eq!(ControlCommand::parse("quality", "abc"), None);
    }

    #[test]
    fn state_roundtrip() {
        let cell = StateCell::new(PipelineState::Uninitialized);
        for state in [
            PipelineState::Ready,
            PipelineState::Degraded,
            PipelineState::Recovering,
            PipelineState::Uninitialized,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }
}
