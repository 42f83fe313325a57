//! Per-process sampler: delta-based CPU accounting and memory gauges

use crate::collector::{ProcessCollector, ProcessHandle};
use crate::error::{CollectError, MonitorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Source of wall-clock time for CPU accounting.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub process_id: u32,
    pub process_name: String,
    pub cpu_usage_percent: f64,
    #[serde(rename = "memoryUsageMB")]
    pub memory_usage_mb: f64,
    #[serde(rename = "workingSetMB")]
    pub working_set_mb: f64,
    #[serde(rename = "privateMemoryMB")]
    pub private_memory_mb: f64,
}

impl MetricsSnapshot {
    /// Compact single-line JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Wall time and cumulative CPU time of the previous sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuBaseline {
    pub wall_time: DateTime<Utc>,
    pub cpu_time: Duration,
}

/// Rounds to 2 decimals, ties to even.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_MB)
}

/// CPU utilisation over an interval as a share of all logical processors.
///
/// A non-positive wall interval yields 0 instead of NaN/inf. The result is
/// clamped to `[0, 100]`, which also hides clock skew or counter glitches
/// that would push it outside that range.
pub fn cpu_usage_percent(cpu_delta_ms: f64, wall_delta_ms: f64, cores: usize) -> f64 {
    if wall_delta_ms <= 0.0 {
        return 0.0;
    }
    let cores = cores.max(1) as f64;
    let percent = 100.0 * cpu_delta_ms / (cores * wall_delta_ms);
    round2(percent.clamp(0.0, 100.0))
}

fn millis_between(later: Duration, earlier: Duration) -> f64 {
    match later.checked_sub(earlier) {
        Some(delta) => delta.as_secs_f64() * 1000.0,
        None => -((earlier - later).as_secs_f64() * 1000.0),
    }
}

struct SamplerState {
    handle: Option<Box<dyn ProcessHandle>>,
    baseline: CpuBaseline,
}

/// Bound to one process for its whole lifetime.
///
/// The first [`sample`](Sampler::sample) measures CPU usage over the window
/// since construction; no priming call is needed.
pub struct Sampler {
    pid: u32,
    cores: usize,
    clock: Arc<dyn Clock>,
    state: Mutex<SamplerState>,
}

impl Sampler {
    pub fn new(collector: &dyn ProcessCollector, pid: u32) -> Result<Self> {
        Self::with_clock(collector, pid, Arc::new(SystemClock))
    }

    pub fn with_clock(
        collector: &dyn ProcessCollector,
        pid: u32,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let mut handle = collector
            .open(pid)
            .map_err(|e| MonitorError::from_open(pid, e))?;
        let counters = handle
            .refresh()
            .map_err(|e| MonitorError::from_open(pid, e))?;
        let baseline = CpuBaseline {
            wall_time: clock.now(),
            cpu_time: counters.cpu_time,
        };
        let cores = collector.logical_cpus().max(1);
        debug!("Sampler bound to PID {} ({}), {} logical CPUs", pid, counters.name, cores);

        Ok(Self {
            pid,
            cores,
            clock,
            state: Mutex::new(SamplerState {
                handle: Some(handle),
                baseline,
            }),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn baseline(&self) -> CpuBaseline {
        self.lock().baseline
    }

    pub fn is_released(&self) -> bool {
        self.lock().handle.is_none()
    }

    /// Takes one snapshot and advances the CPU baseline.
    ///
    /// The whole read-compute-commit sequence runs under the state lock so
    /// concurrent callers never share or skip a CPU window. A failed read
    /// leaves the baseline untouched.
    pub fn sample(&self) -> Result<MetricsSnapshot> {
        let mut state = self.lock();
        let handle = state.handle.as_mut().ok_or(MonitorError::ProcessTerminated {
            pid: self.pid,
            source: CollectError::Exited,
        })?;
        let counters = handle.refresh().map_err(|source| MonitorError::ProcessTerminated {
            pid: self.pid,
            source,
        })?;
        let now = self.clock.now();

        let cpu_delta_ms = millis_between(counters.cpu_time, state.baseline.cpu_time);
        let wall_delta_ms = (now - state.baseline.wall_time)
            .num_microseconds()
            .map(|us| us as f64 / 1000.0)
            .unwrap_or(0.0);
        let cpu_usage_percent = cpu_usage_percent(cpu_delta_ms, wall_delta_ms, self.cores);

        state.baseline = CpuBaseline {
            wall_time: now,
            cpu_time: counters.cpu_time,
        };

        Ok(MetricsSnapshot {
            timestamp: now,
            process_id: self.pid,
            process_name: counters.name,
            cpu_usage_percent,
            memory_usage_mb: bytes_to_mb(counters.paged_bytes),
            working_set_mb: bytes_to_mb(counters.working_set_bytes),
            private_memory_mb: bytes_to_mb(counters.private_bytes),
        })
    }

    /// Drops the process handle. Safe to call any number of times.
    pub fn release(&self) {
        if self.lock().handle.take().is_some() {
            debug!("Sampler for PID {} released", self.pid);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SamplerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.release();
    }
}
