use crate::{RecordSink, SinkError, SinkMetadata, SinkState};
use chrono::{DateTime, Utc};
use stage_types::{PositionSample, StageReading};

/// Sample at a fixed instant with `x` set and the other axes zeroed
pub fn sample_with_x(x: f64) -> PositionSample {
    let timestamp = DateTime::<Utc>::UNIX_EPOCH.fixed_offset();
    PositionSample::from_reading(timestamp, &StageReading::complete(x, 0.0, 0.0, 0.0, 0.0))
        .unwrap_or_else(|e| panic!("test sample must be complete: {}", e))
}

/// A sink that just collects samples in memory for testing
#[derive(Debug, Default)]
pub struct CollectorSink {
    samples: Vec<PositionSample>,
    closed: bool,
    close_calls: u32,
    fail_next: u32,
    records_failed: u64,
    last_error: Option<String>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` appends fail without storing anything
    pub fn fail_next_appends(&mut self, count: u32) {
        self.fail_next = count;
    }

    /// Samples accepted so far, in append order
    pub fn samples(&self) -> &[PositionSample] {
        &self.samples
    }

    /// Number of times `close` was called
    pub fn close_calls(&self) -> u32 {
        self.close_calls
    }
}

impl RecordSink for CollectorSink {
    fn append(&mut self, sample: &PositionSample) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }

        if self.fail_next > 0 {
            self.fail_next -= 1;
            self.records_failed += 1;
            let error = SinkError::Other("Simulated failure".to_string());
            self.last_error = Some(error.to_string());
            return Err(error);
        }

        self.samples.push(*sample);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.close_calls += 1;
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn metadata(&self) -> SinkMetadata {
        let state = if self.closed {
            SinkState::Closed
        } else {
            SinkState::Open
        };
        SinkMetadata {
            records_written: self.samples.len() as u64,
            records_failed: self.records_failed,
            last_error: self.last_error.clone(),
            ..SinkMetadata::new("test-collector", "collector")
                .with_endpoint("memory://test")
                .with_state(state)
        }
    }
}

/// A sink that always fails for testing error conditions
#[derive(Debug)]
pub struct FailingSink {
    error_message: String,
    attempts: u64,
    close_calls: u32,
}

impl FailingSink {
    pub fn new(error_message: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
            attempts: 0,
            close_calls: 0,
        }
    }

    /// Number of appends attempted
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Number of times `close` was called
    pub fn close_calls(&self) -> u32 {
        self.close_calls
    }
}

impl Default for FailingSink {
    fn default() -> Self {
        Self::new("Simulated failure")
    }
}

impl RecordSink for FailingSink {
    fn append(&mut self, _sample: &PositionSample) -> Result<(), SinkError> {
        self.attempts += 1;
        Err(SinkError::Other(self.error_message.clone()))
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.close_calls += 1;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.close_calls > 0
    }

    fn metadata(&self) -> SinkMetadata {
        let state = if self.is_closed() {
            SinkState::Closed
        } else {
            SinkState::Open
        };
        SinkMetadata {
            records_failed: self.attempts,
            last_error: Some(self.error_message.clone()),
            ..SinkMetadata::new("failing-sink", "test-failing").with_state(state)
        }
    }
}
