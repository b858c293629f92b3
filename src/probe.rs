// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Readiness probe and memory report behind the health endpoint.

use crate::{
    config::BufferRegion,
    gate::AcquirePolicy,
    session::{PipelineState, SensorSession},
};
use serde::Serialize;
use std::{fs, io, path::PathBuf, sync::Mutex};
use sysinfo::System;
use tracing::{debug, warn};

/// Free memory per buffer region.
pub trait MemoryMonitor: Send + Sync {
    fn free_bytes(&self, region: BufferRegion) -> u64;
}

/// Free memory of the running system.
///
/// Internal memory is the available system memory as reported by `sysinfo`.
/// External memory is `CmaFree` from `/proc/meminfo`, the contiguous region
/// frame buffers are carved from, which `sysinfo` does not expose.
pub struct SystemMemory {
    system: Mutex<System>,
    meminfo: PathBuf,
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::with_meminfo("/proc/meminfo")
    }
}

impl SystemMemory {
    /// Reads the contiguous region from `meminfo` instead of `/proc/meminfo`.
    pub fn with_meminfo(meminfo: impl Into<PathBuf>) -> Self {
        Self {
            system: Mutex::new(System::new()),
            meminfo: meminfo.into(),
        }
    }

    fn available(&self) -> u64 {
        match self.system.lock() {
            Ok(mut system) => {
                system.refresh_memory();
                system.available_memory()
            }
            Err(_) => 0,
        }
    }

    fn cma_free(&self) -> io::Result<u64> {
        let text = fs::read_to_string(&self.meminfo)?;
        Ok(meminfo_field(&text, "CmaFree").unwrap_or(0))
    }
}

impl MemoryMonitor for SystemMemory {
    fn free_bytes(&self, region: BufferRegion) -> u64 {
        match region {
            BufferRegion::Internal => self.available(),
            BufferRegion::External => match self.cma_free() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %self.meminfo.display(), "cannot read meminfo: {e}");
                    0
                }
            },
        }
    }
}

/// Value of `key` in meminfo text, in bytes.
fn meminfo_field(text: &str, key: &str) -> Option<u64> {
    text.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != key {
            return None;
        }
        let mut parts = rest.split_whitespace();
        let value: u64 = parts.next()?.parse().ok()?;
        match parts.next() {
            Some("kB") => Some(value * 1024),
            _ => Some(value),
        }
    })
}

/// Result of one readiness probe, serialized as the health response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub ok: bool,
    pub free_int: u64,
    pub free_psram: u64,
}

/// Failed report carrying only the memory figures, for when the pipeline
/// cannot be asked.
pub fn unready(memory: &dyn MemoryMonitor) -> ProbeReport {
    ProbeReport {
        ok: false,
        free_int: memory.free_bytes(BufferRegion::Internal),
        free_psram: memory.free_bytes(BufferRegion::External),
    }
}

/// Checks whether the pipeline currently delivers frames.
///
/// Never runs while recovering. Otherwise makes one acquisition bounded by
/// the probe attempt count and releases the frame right away. The pipeline
/// state is left alone, see [`SensorSession::record_probe`].
pub fn probe(session: &mut SensorSession, memory: &dyn MemoryMonitor) -> ProbeReport {
    if session.state() == PipelineState::Recovering {
        debug!("probe skipped while recovering");
        return unready(memory);
    }

    let policy = AcquirePolicy {
        max_nulls: session.timings().probe_attempts,
        retry_delay: session.timings().null_retry_delay,
    };
    let ok = match session.acquire_with(&policy) {
        Ok(frame) => {
            debug!(bytes = frame.len(), "probe frame");
            frame.release();
            true
        }
        Err(e) => {
            debug!("probe failed: {e}");
            false
        }
    };

    ProbeReport {
        ok,
        free_int: memory.free_bytes(BufferRegion::Internal),
        free_psram: memory.free_bytes(BufferRegion::External),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:        3931716 kB\n\
                           MemFree:          257384 kB\n\
                           MemAvailable:    1902036 kB\n\
                           CmaTotal:         655360 kB\n\
                           CmaFree:          512000 kB\n";

    #[test]
    fn parses_fields_in_bytes() {
        assert_eq!(meminfo_field(MEMINFO, "MemAvailable"), Some(1902036 * 1024));
        assert_eq!(meminfo_field(MEMINFO, "CmaFree"), Some(512000 * 1024));
        assert_eq!(meminfo_field(MEMINFO, "Cma"), None);
        assert_eq!(meminfo_field(MEMINFO, "HugePages_Total"), None);
    }

    #[test]
    fn report_json_shape() {
        let report = ProbeReport {
            ok: true,
            free_int: 10,
            free_psram: 0,
        };
        let json = serde_json::to_value(report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ok": true, "free_int": 10, "free_psram": 0})
        );
    }
}
