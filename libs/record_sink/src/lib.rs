pub mod error;
pub mod file;
pub mod metadata;
pub mod test_utils;

use stage_types::PositionSample;
use std::fmt::Debug;

pub use error::SinkError;
pub use file::{read_log, CsvFileSink, DurableFile, LogContents, OpenMode};
pub use metadata::{SinkMetadata, SinkState};

/// A durable destination for position samples
///
/// `append` must not return `Ok` until the record would survive a crash.
/// A failed append leaves the sink usable; only `close` ends it.
pub trait RecordSink: Send + Debug {
    /// Persist a single sample
    fn append(&mut self, sample: &PositionSample) -> Result<(), SinkError>;

    /// Flush and release the underlying resource (no-op if already closed)
    fn close(&mut self) -> Result<(), SinkError>;

    /// Check if the sink has been closed
    fn is_closed(&self) -> bool;

    /// Get sink metadata for debugging/monitoring
    fn metadata(&self) -> SinkMetadata {
        SinkMetadata::default()
    }
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn append(&mut self, sample: &PositionSample) -> Result<(), SinkError> {
        (**self).append(sample)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn metadata(&self) -> SinkMetadata {
        (**self).metadata()
    }
}
