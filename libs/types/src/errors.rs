//! Error types for sample construction and record parsing

use thiserror::Error;

/// Reasons a raw stage reading cannot become a [`crate::PositionSample`]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IncompleteReading {
    /// Driver returned too few or too many axis values
    #[error("expected {expected} axis values, got {got}")]
    WrongArity { expected: usize, got: usize },

    /// An axis reported NaN or infinity
    #[error("axis {axis} reported a non-finite value ({value})")]
    NonFinite { axis: &'static str, value: f64 },
}

/// Errors raised while parsing a persisted CSV record
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    /// Line does not have one field per column
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    /// Timestamp column is not RFC 3339
    #[error("invalid timestamp '{input}': {reason}")]
    InvalidTimestamp { input: String, reason: String },

    /// A numeric column failed to parse
    #[error("invalid value '{input}' in column {column}")]
    InvalidNumber { column: &'static str, input: String },

    /// Values parsed but do not form a complete sample
    #[error(transparent)]
    Incomplete(#[from] IncompleteReading),
}
