//! # Stage Types
//!
//! Data model shared by every crate of the stage logger workspace.
//!
//! ## Contents
//!
//! - [`StageReading`]: the raw axis values handed back by an instrument driver.
//!   A reading may be partial; nothing downstream trusts it until it has been
//!   turned into a sample.
//! - [`PositionSample`]: one complete, timestamped reading. Construction is the
//!   only place where completeness is checked, so a sample that exists is
//!   always fully populated.
//! - [`record`]: the CSV line format used by the record sink, including the
//!   header and a parser for reading persisted files back.
//!
//! ## Example
//!
//! ```rust
//! use chrono::Local;
//! use stage_types::{PositionSample, StageReading};
//!
//! let reading = StageReading::complete(12.5, -3.0, 0.25, 10.0, 0.0);
//! let sample = PositionSample::from_reading(Local::now().fixed_offset(), &reading)?;
//! let line = sample.to_record();
//! assert_eq!(stage_types::parse_record(&line)?, sample);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod errors;
pub mod record;
pub mod sample;

pub use errors::{IncompleteReading, RecordError};
pub use record::{header_line, is_header, parse_record, FIELD_NAMES, FIELD_SEPARATOR};
pub use sample::{PositionSample, StageReading, AXIS_COUNT, AXIS_NAMES};
