//! Error types for process sampling and output

use thiserror::Error;

/// Failures reported by a [`ProcessCollector`](crate::collector::ProcessCollector)
/// or one of its handles.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("no such process")]
    NotFound,

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("process has exited")]
    Exited,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Process with PID {pid} not found.")]
    ProcessNotFound { pid: u32 },

    #[error("Cannot access process with PID {pid}: {reason}")]
    ProcessAccessDenied { pid: u32, reason: String },

    #[error("Process with PID {pid} does not exist or has been terminated.")]
    ProcessTerminated {
        pid: u32,
        #[source]
        source: CollectError,
    },

    #[error("Failed to write output to {target}: {source}")]
    SinkWrite {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl MonitorError {
    /// Maps a collector failure seen while binding to a process.
    pub fn from_open(pid: u32, err: CollectError) -> Self {
        match err {
            CollectError::AccessDenied(reason) => MonitorError::ProcessAccessDenied { pid, reason },
            CollectError::NotFound | CollectError::Exited => MonitorError::ProcessNotFound { pid },
            CollectError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                MonitorError::ProcessNotFound { pid }
            }
            CollectError::Io(e) => MonitorError::ProcessAccessDenied { pid, reason: e.to_string() },
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
