// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Scripted stand-ins for the camera driver, control lines and memory.

#![allow(dead_code)]

use camera_streamer::{
    config::{BufferRegion, FrameSize, PixelFormat, SensorConfig, Timings},
    driver::{CameraDriver, FrameBuffer, SensorControl, SensorId},
    error::DriverError,
    gpio::Line,
    probe::MemoryMonitor,
    recovery::{BusRecovery, PowerSequencer},
    session::SensorSession,
};
use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

/// What the fake driver does and what happened to it.
pub struct MockState {
    /// Results of upcoming frame gets: `Some(len)` lends a frame of `len`
    /// bytes, `None` is a null result.
    pub script: VecDeque<Option<usize>>,
    /// Result once the script is used up.
    pub fallback: Option<usize>,
    /// Outcomes of upcoming init calls, success once used up.
    pub init_results: VecDeque<bool>,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub fail_controls: bool,
    /// Frame sizes the driver refuses, stopping capture like a V4L2 node
    /// whose format negotiation failed.
    pub reject_sizes: Vec<FrameSize>,
    /// Time every init call takes.
    pub init_delay: Duration,

    pub inits: Vec<SensorConfig>,
    pub deinits: usize,
    pub gets: usize,
    pub nulls: usize,
    pub returns: usize,
    pub outstanding: Vec<u64>,
    pub bad_returns: usize,
    pub params: Vec<String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            script: VecDeque::new(),
            fallback: None,
            init_results: VecDeque::new(),
            format: PixelFormat::Jpeg,
            width: 640,
            height: 480,
            fail_controls: false,
            reject_sizes: Vec::new(),
            init_delay: Duration::ZERO,
            inits: Vec::new(),
            deinits: 0,
            gets: 0,
            nulls: 0,
            returns: 0,
            outstanding: Vec::new(),
            bad_returns: 0,
            params: Vec::new(),
        }
    }
}

/// Test-side view of a [`MockDriver`].
#[derive(Clone)]
pub struct MockHandle(Arc<Mutex<MockState>>);

impl MockHandle {
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap()
    }

    pub fn push_frames(&self, lens: &[usize]) {
        self.state().script.extend(lens.iter().map(|len| Some(*len)));
    }

    pub fn push_nulls(&self, count: usize) {
        self.state()
            .script
            .extend(std::iter::repeat(None).take(count));
    }

    pub fn push_init_results(&self, results: &[bool]) {
        self.state().init_results.extend(results.iter().copied());
    }

    /// Every lent frame came back exactly once.
    pub fn balanced(&self) -> bool {
        let state = self.state();
        state.gets == state.returns && state.outstanding.is_empty() && state.bad_returns == 0
    }
}

/// Byte pattern of the frame with sequence `seq`.
pub fn frame_bytes(seq: u64, len: usize) -> Vec<u8> {
    vec![(seq % 251) as u8; len]
}

pub struct MockDriver {
    shared: Arc<Mutex<MockState>>,
    initialized: bool,
    stopped: bool,
    sequence: u64,
}

impl MockDriver {
    pub fn new() -> (Self, MockHandle) {
        let shared = Arc::new(Mutex::new(MockState::default()));
        let driver = Self {
            shared: shared.clone(),
            initialized: false,
            stopped: false,
            sequence: 0,
        };
        (driver, MockHandle(shared))
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.shared.lock().unwrap()
    }

    fn record(&mut self, param: String) -> Result<(), DriverError> {
        let mut state = self.state();
        if state.fail_controls {
            return Err(DriverError::Unsupported(param));
        }
        state.params.push(param);
        Ok(())
    }
}

impl CameraDriver for MockDriver {
    fn init(&mut self, config: &SensorConfig) -> Result<(), DriverError> {
        let (ok, delay) = {
            let mut state = self.state();
            state.inits.push(config.clone());
            (state.init_results.pop_front().unwrap_or(true), state.init_delay)
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.stopped = false;
        if ok {
            self.initialized = true;
            Ok(())
        } else {
            Err(DriverError::NotDetected("scripted failure".to_owned()))
        }
    }

    fn deinit(&mut self) {
        self.initialized = false;
        self.stopped = false;
        self.state().deinits += 1;
    }

    fn is_initialized(&self) -> bool {
        self.initialized && !self.stopped
    }

    fn frame_get(&mut self) -> Option<FrameBuffer> {
        if !self.is_initialized() {
            return None;
        }
        let mut state = self.shared.lock().unwrap();
        let next = match state.script.pop_front() {
            Some(next) => next,
            None => state.fallback,
        };
        let Some(len) = next else {
            state.nulls += 1;
            return None;
        };
        self.sequence += 1;
        state.gets += 1;
        state.outstanding.push(self.sequence);
        Some(FrameBuffer::new(
            0,
            frame_bytes(self.sequence, len),
            state.format,
            state.width,
            state.height,
            self.sequence,
            Duration::ZERO,
        ))
    }

    fn frame_return(&mut self, fb: FrameBuffer) {
        let mut state = self.state();
        state.returns += 1;
        let lent = state.outstanding.iter().position(|seq| *seq == fb.sequence());
        match lent {
            Some(pos) => {
                state.outstanding.remove(pos);
            }
            None => state.bad_returns += 1,
        }
    }

    fn sensor(&mut self) -> Option<&mut dyn SensorControl> {
        if self.initialized {
            Some(self as &mut dyn SensorControl)
        } else {
            None
        }
    }
}

impl SensorControl for MockDriver {
    fn id(&self) -> SensorId {
        SensorId {
            model: "OV2640".to_owned(),
            driver: "mock".to_owned(),
            version: 0x2642,
        }
    }

    fn set_framesize(&mut self, size: FrameSize) -> Result<(), DriverError> {
        if self.state().reject_sizes.contains(&size) {
            self.stopped = true;
            return Err(DriverError::Unsupported(size.name().to_owned()));
        }
        self.stopped = false;
        self.record(format!("framesize={}", size.name()))
    }

    fn set_quality(&mut self, quality: u8) -> Result<(), DriverError> {
        self.record(format!("quality={quality}"))
    }

    fn set_gain_ctrl(&mut self, enable: bool) -> Result<(), DriverError> {
        self.record(format!("gain_ctrl={enable}"))
    }

    fn set_exposure_ctrl(&mut self, enable: bool) -> Result<(), DriverError> {
        self.record(format!("exposure_ctrl={enable}"))
    }

    fn set_whitebal(&mut self, enable: bool) -> Result<(), DriverError> {
        self.record(format!("whitebal={enable}"))
    }

    fn set_awb_gain(&mut self, enable: bool) -> Result<(), DriverError> {
        self.record(format!("awb_gain={enable}"))
    }

    fn set_hmirror(&mut self, enable: bool) -> Result<(), DriverError> {
        self.record(format!("hmirror={enable}"))
    }

    fn set_vflip(&mut self, enable: bool) -> Result<(), DriverError> {
        self.record(format!("vflip={enable}"))
    }
}

/// Timings without delays and without warm-up.
pub fn fast_timings() -> Timings {
    Timings {
        bus_half_period: Duration::ZERO,
        power_settle: Duration::ZERO,
        warmup_frames: 0,
        warmup_delay: Duration::ZERO,
        max_consecutive_nulls: 5,
        null_retry_delay: Duration::ZERO,
        probe_attempts: 3,
        stream_yield: Duration::ZERO,
        stats_window: 30,
        client_stall: Duration::from_millis(500),
    }
}

/// Session over a fresh mock driver with no control lines.
pub fn mock_session(timings: Timings) -> (SensorSession, MockHandle) {
    let (driver, handle) = MockDriver::new();
    let session = SensorSession::new(
        Box::new(driver),
        BusRecovery::disconnected(),
        PowerSequencer::disconnected(),
        SensorConfig::default(),
        timings,
    );
    (session, handle)
}

/// Initialized session over a fresh mock driver.
pub fn ready_session() -> (SensorSession, MockHandle) {
    let (mut session, handle) = mock_session(fast_timings());
    session.initialize(SensorConfig::default()).unwrap();
    (session, handle)
}

/// Shared log of line activity, entries like `"scl:low"`.
#[derive(Clone, Default)]
pub struct LineLog(Arc<Mutex<Vec<String>>>);

impl LineLog {
    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }
}

/// Fake line that reads low for its first `low_reads` samples.
pub struct MockLine {
    name: &'static str,
    log: LineLog,
    low_reads: usize,
}

impl MockLine {
    pub fn boxed(name: &'static str, log: &LineLog, low_reads: usize) -> Option<Box<dyn Line>> {
        Some(Box::new(MockLine {
            name,
            log: log.clone(),
            low_reads,
        }))
    }
}

impl Line for MockLine {
    fn drive_low(&mut self) -> io::Result<()> {
        self.log.push(format!("{}:low", self.name));
        Ok(())
    }

    fn drive_high(&mut self) -> io::Result<()> {
        self.log.push(format!("{}:high", self.name));
        Ok(())
    }

    fn release(&mut self) -> io::Result<()> {
        self.log.push(format!("{}:release", self.name));
        Ok(())
    }

    fn is_high(&mut self) -> io::Result<bool> {
        self.log.push(format!("{}:read", self.name));
        if self.low_reads > 0 {
            self.low_reads -= 1;
            Ok(false)
        } else {
            Ok(true)
        }
    }
}

/// Fixed memory figures.
pub struct FixedMemory {
    pub internal: u64,
    pub external: u64,
}

impl MemoryMonitor for FixedMemory {
    fn free_bytes(&self, region: BufferRegion) -> u64 {
        match region {
            BufferRegion::Internal => self.internal,
            BufferRegion::External => self.external,
        }
    }
}
