//! Run configuration and mutable state of one logging session

use crate::error::ConfigurationError;
use crate::shutdown::StopHandle;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Optional bounds that end a session normally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_samples: Option<u64>,
    pub max_duration: Option<Duration>,
}

impl SessionLimits {
    pub fn is_unbounded(&self) -> bool {
        self.max_samples.is_none() && self.max_duration.is_none()
    }
}

/// One logging run, owned by the sampling loop while it runs
#[derive(Debug)]
pub struct LogSession {
    output_path: PathBuf,
    interval: Duration,
    running: StopHandle,
    limits: SessionLimits,
    pub(crate) sample_count: u64,
    pub(crate) started_at: Option<DateTime<Local>>,
}

impl LogSession {
    /// Create a session; the interval must be strictly positive
    pub fn new(
        output_path: impl Into<PathBuf>,
        interval: Duration,
        running: StopHandle,
    ) -> Result<Self, ConfigurationError> {
        if interval.is_zero() {
            return Err(ConfigurationError::InvalidInterval {
                input: format!("{:?}", interval),
                reason: "interval must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            output_path: output_path.into(),
            interval,
            running,
            limits: SessionLimits::default(),
            sample_count: 0,
            started_at: None,
        })
    }

    pub fn with_limits(mut self, limits: SessionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    /// Handle that can end this session from another task
    pub fn stop_handle(&self) -> StopHandle {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_running()
    }

    /// Samples durably written so far
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Wall-clock instant at which sampling began
    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.started_at
    }
}
