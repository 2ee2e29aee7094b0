//! CSV record format for persisted samples
//!
//! One header line, then one line per sample:
//!
//! ```text
//! timestamp,x_position,y_position,z_position,alpha_tilt,beta_tilt
//! 2026-03-14T09:26:53.589+01:00,12.5,-3,0.25,10,0
//! ```
//!
//! Floats are written with Rust's shortest round-trip `Display` and timestamps
//! as RFC 3339 with milliseconds. Neither form can contain the separator, so
//! fields are never quoted.

use crate::errors::RecordError;
use crate::sample::{PositionSample, StageReading, AXIS_COUNT};
use chrono::{DateTime, SecondsFormat};

/// Column separator
pub const FIELD_SEPARATOR: char = ',';

/// Column names, in file order
pub const FIELD_NAMES: [&str; AXIS_COUNT + 1] = [
    "timestamp",
    "x_position",
    "y_position",
    "z_position",
    "alpha_tilt",
    "beta_tilt",
];

/// Header line without the trailing newline
pub fn header_line() -> String {
    FIELD_NAMES.join(",")
}

/// Whether `line` is the expected header (surrounding whitespace ignored)
pub fn is_header(line: &str) -> bool {
    line.trim() == header_line()
}

impl PositionSample {
    /// Render as one CSV line without the trailing newline
    pub fn to_record(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}{sep}{}{sep}{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, false),
            self.x,
            self.y,
            self.z,
            self.alpha_tilt,
            self.beta_tilt,
            sep = FIELD_SEPARATOR,
        )
    }
}

/// Parse one CSV line produced by [`PositionSample::to_record`]
pub fn parse_record(line: &str) -> Result<PositionSample, RecordError> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(FIELD_SEPARATOR).collect();
    if fields.len() != FIELD_NAMES.len() {
        return Err(RecordError::FieldCount {
            expected: FIELD_NAMES.len(),
            found: fields.len(),
        });
    }

    let timestamp =
        DateTime::parse_from_rfc3339(fields[0]).map_err(|e| RecordError::InvalidTimestamp {
            input: fields[0].to_string(),
            reason: e.to_string(),
        })?;

    let values = fields[1..]
        .iter()
        .zip(FIELD_NAMES[1..].iter().copied())
        .map(|(raw, column)| {
            raw.parse::<f64>().map_err(|_| RecordError::InvalidNumber {
                column,
                input: raw.to_string(),
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    Ok(PositionSample::from_reading(timestamp, &StageReading(values))?)
}
