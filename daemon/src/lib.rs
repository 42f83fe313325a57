//! pidwatch: samples one process's CPU and memory usage on a fixed cadence
//! and writes each snapshot as JSON to stdout or a file.

pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod monitor;
pub mod sampler;
pub mod sink;

pub use error::{CollectError, MonitorError};
pub use monitor::{Monitor, MonitorState, RunReport};
pub use sampler::{MetricsSnapshot, Sampler};
