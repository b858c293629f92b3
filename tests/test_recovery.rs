// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod common;

use camera_streamer::recovery::{BusRecovery, PowerSequencer, RECOVERY_PULSES};
use common::{LineLog, MockLine};
use std::time::Duration;

fn bus(log: &LineLog, sda_low_reads: usize) -> BusRecovery {
    BusRecovery::new(
        MockLine::boxed("sda", log, sda_low_reads),
        MockLine::boxed("scl", log, 0),
        Duration::ZERO,
    )
}

#[test]
fn test_idle_bus_gets_stop_only() {
    let log = LineLog::default();
    bus(&log, 0).recover_bus();

    assert_eq!(
        log.events(),
        vec![
            "sda:release",
            "scl:release",
            "sda:read",
            "sda:read",
            "scl:low",
            "sda:low",
            "scl:release",
            "sda:release",
            "sda:release",
            "scl:release",
        ]
    );
}

#[test]
fn test_pulses_until_data_released() {
    let log = LineLog::default();
    bus(&log, 4).recover_bus();

    // four pulses plus the clock low of the stop condition
    assert_eq!(log.count("scl:low"), 5);
    assert_eq!(log.events().last().map(String::as_str), Some("scl:release"));
}

#[test]
fn test_pulses_bounded_when_stuck() {
    let log = LineLog::default();
    bus(&log, usize::MAX).recover_bus();

    assert_eq!(log.count("scl:low") as u32, RECOVERY_PULSES + 1);
    // lines are left released whatever the outcome
    let events = log.events();
    assert_eq!(&events[events.len() - 2..], &["sda:release", "scl:release"]);
}

#[test]
fn test_missing_line_skips_recovery() {
    let log = LineLog::default();
    BusRecovery::new(MockLine::boxed("sda", &log, 3), None, Duration::ZERO).recover_bus();
    BusRecovery::disconnected().recover_bus();
    assert!(log.events().is_empty());
}

#[test]
fn test_power_then_reset() {
    let log = LineLog::default();
    PowerSequencer::new(
        MockLine::boxed("pwdn", &log, 0),
        MockLine::boxed("reset", &log, 0),
        Duration::ZERO,
    )
    .pulse_power_and_reset();

    assert_eq!(
        log.events(),
        vec!["pwdn:high", "pwdn:low", "reset:low", "reset:high"]
    );
}

#[test]
fn test_power_skips_unconnected_lines() {
    let log = LineLog::default();
    PowerSequencer::new(None, MockLine::boxed("reset", &log, 0), Duration::ZERO)
        .pulse_power_and_reset();
    assert_eq!(log.events(), vec!["reset:low", "reset:high"]);

    let log = LineLog::default();
    PowerSequencer::new(MockLine::boxed("pwdn", &log, 0), None, Duration::ZERO)
        .pulse_power_and_reset();
    assert_eq!(log.events(), vec!["pwdn:high", "pwdn:low"]);

    PowerSequencer::disconnected().pulse_power_and_reset();
}
