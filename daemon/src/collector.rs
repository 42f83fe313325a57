//! Process counter collector (reads /proc on Linux)

pub mod linux;

pub use linux::LinuxProcessCollector;

use crate::error::CollectError;
use std::time::Duration;

/// Raw counters read from the OS in one refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCounters {
    pub name: String,
    /// User + system time consumed by all threads since the process started.
    pub cpu_time: Duration,
    pub paged_bytes: u64,
    pub working_set_bytes: u64,
    pub private_bytes: u64,
}

/// A live reference to one OS process. Dropping it releases whatever the
/// collector holds open for that process.
pub trait ProcessHandle: Send {
    fn pid(&self) -> u32;

    /// Re-reads the process counters. Fails once the process is gone.
    fn refresh(&mut self) -> Result<ProcessCounters, CollectError>;
}

pub trait ProcessCollector: Send + Sync {
    fn open(&self, pid: u32) -> Result<Box<dyn ProcessHandle>, CollectError>;
    fn logical_cpus(&self) -> usize;
}
