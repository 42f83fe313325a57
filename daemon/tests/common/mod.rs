//! Scripted collector and clock for driving the sampler deterministically

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use pidwatch_daemon::collector::{ProcessCollector, ProcessCounters, ProcessHandle};
use pidwatch_daemon::error::CollectError;
use pidwatch_daemon::sampler::Clock;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    NotFound,
    AccessDenied,
}

struct FakeProcess {
    counters: Option<ProcessCounters>,
    open_failure: Option<OpenFailure>,
}

/// A single fake process whose counters tests update between samples.
/// Setting it exited makes every later refresh fail.
#[derive(Clone)]
pub struct FakeCollector {
    process: Arc<Mutex<FakeProcess>>,
    cores: usize,
    cpu_step_ms: Arc<AtomicU64>,
    pub refreshes: Arc<AtomicUsize>,
    pub open_handles: Arc<AtomicUsize>,
}

impl FakeCollector {
    pub fn new(cores: usize) -> Self {
        Self {
            process: Arc::new(Mutex::new(FakeProcess {
                counters: Some(counters(0, 0)),
                open_failure: None,
            })),
            cores,
            cpu_step_ms: Arc::new(AtomicU64::new(0)),
            refreshes: Arc::new(AtomicUsize::new(0)),
            open_handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(failure: OpenFailure) -> Self {
        let collector = Self::new(1);
        collector.process.lock().unwrap().open_failure = Some(failure);
        collector
    }

    /// Every refresh burns this much more CPU time before reporting.
    pub fn with_cpu_step_ms(self, step_ms: u64) -> Self {
        self.cpu_step_ms.store(step_ms, Ordering::SeqCst);
        self
    }

    pub fn set(&self, counters: ProcessCounters) {
        self.process.lock().unwrap().counters = Some(counters);
    }

    pub fn set_cpu_ms(&self, cpu_ms: u64) {
        let mut process = self.process.lock().unwrap();
        if let Some(c) = process.counters.as_mut() {
            c.cpu_time = Duration::from_millis(cpu_ms);
        }
    }

    pub fn exit(&self) {
        self.process.lock().unwrap().counters = None;
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn live_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }
}

impl ProcessCollector for FakeCollector {
    fn open(&self, pid: u32) -> Result<Box<dyn ProcessHandle>, CollectError> {
        match self.process.lock().unwrap().open_failure {
            Some(OpenFailure::NotFound) => return Err(CollectError::NotFound),
            Some(OpenFailure::AccessDenied) => {
                return Err(CollectError::AccessDenied("operation not permitted".into()))
            }
            None => {}
        }
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeHandle {
            pid,
            collector: self.clone(),
        }))
    }

    fn logical_cpus(&self) -> usize {
        self.cores
    }
}

struct FakeHandle {
    pid: u32,
    collector: FakeCollector,
}

impl ProcessHandle for FakeHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn refresh(&mut self) -> Result<ProcessCounters, CollectError> {
        self.collector.refreshes.fetch_add(1, Ordering::SeqCst);
        let step = Duration::from_millis(self.collector.cpu_step_ms.load(Ordering::SeqCst));
        let mut process = self.collector.process.lock().unwrap();
        let counters = process.counters.as_mut().ok_or(CollectError::Exited)?;
        counters.cpu_time += step;
        Ok(counters.clone())
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.collector.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn counters(cpu_ms: u64, working_set_bytes: u64) -> ProcessCounters {
    ProcessCounters {
        name: "fake-worker".to_string(),
        cpu_time: Duration::from_millis(cpu_ms),
        paged_bytes: 0,
        working_set_bytes,
        private_bytes: working_set_bytes / 2,
    }
}

/// Wall clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
    step_ms: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Self::start())),
            step_ms: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Clock that moves forward by `step_ms` on every read.
    pub fn stepping(step_ms: i64) -> Self {
        let clock = Self::new();
        clock.step_ms.store(step_ms, Ordering::SeqCst);
        clock
    }

    pub fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    pub fn advance_ms(&self, ms: i64) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::milliseconds(ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::milliseconds(self.step_ms.load(Ordering::SeqCst));
        *now
    }
}
