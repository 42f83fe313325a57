//! Sampling loop: sample, serialize, write, sleep

use crate::error::MonitorError;
use crate::sampler::Sampler;
use crate::sink::Sink;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    StoppedOk,
    StoppedError,
}

impl MonitorState {
    pub fn is_stopped(self) -> bool {
        !matches!(self, MonitorState::Running)
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub state: MonitorState,
    pub samples: u64,
    pub error: Option<MonitorError>,
}

pub struct Monitor<S: Sink> {
    sampler: Sampler,
    sink: S,
    interval: Duration,
    max_samples: Option<u64>,
    state: MonitorState,
    samples: u64,
    error: Option<MonitorError>,
}

impl<S: Sink> Monitor<S> {
    pub fn new(sampler: Sampler, sink: S) -> Self {
        Self {
            sampler,
            sink,
            interval: DEFAULT_INTERVAL,
            max_samples: None,
            state: MonitorState::Running,
            samples: 0,
            error: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Stops with [`MonitorState::StoppedOk`] after this many snapshots.
    pub fn with_max_samples(mut self, max_samples: Option<u64>) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Runs one sample/serialize/write step. Does nothing once stopped.
    pub async fn tick(&mut self) -> MonitorState {
        if self.state.is_stopped() {
            return self.state;
        }

        let json = match self.sampler.sample().and_then(|s| {
            debug!(
                "PID {}: cpu={:.2}% working_set={:.2}MB",
                s.process_id, s.cpu_usage_percent, s.working_set_mb
            );
            s.to_json()
        }) {
            Ok(json) => json,
            Err(e) => {
                warn!("Sampling stopped: {}", e);
                if let Err(write_err) = self.sink.emit_failure(&e).await {
                    error!("Failed to report error to {}: {}", self.sink.describe(), write_err);
                }
                return self.stop(MonitorState::StoppedError, Some(e));
            }
        };

        if let Err(source) = self.sink.emit(&json).await {
            let e = MonitorError::SinkWrite {
                target: self.sink.describe(),
                source,
            };
            error!("{}", e);
            return self.stop(MonitorState::StoppedError, Some(e));
        }

        self.samples += 1;
        if self.max_samples.is_some_and(|max| self.samples >= max) {
            info!("Reached sample limit of {}", self.samples);
            return self.stop(MonitorState::StoppedOk, None);
        }
        self.state
    }

    /// Loops until the process goes away, the sink fails, or the sample
    /// limit is hit. The interval is slept after each tick's work completes.
    pub async fn run(mut self) -> RunReport {
        info!(
            "Monitoring PID {} every {:?}, writing to {}",
            self.sampler.pid(),
            self.interval,
            self.sink.describe()
        );
        while !self.tick().await.is_stopped() {
            tokio::time::sleep(self.interval).await;
        }
        RunReport {
            state: self.state,
            samples: self.samples,
            error: self.error.take(),
        }
    }

    fn stop(&mut self, state: MonitorState, error: Option<MonitorError>) -> MonitorState {
        self.sampler.release();
        self.state = state;
        self.error = error;
        state
    }
}
