//! Raw readings and validated position samples

use crate::errors::IncompleteReading;
use chrono::{DateTime, FixedOffset, SubsecRound};

/// Number of axes reported by the stage
pub const AXIS_COUNT: usize = 5;

/// Axis names in driver order
pub const AXIS_NAMES: [&str; AXIS_COUNT] = ["x", "y", "z", "alpha_tilt", "beta_tilt"];

/// Axis values exactly as the driver returned them, in `x, y, z, alpha, beta` order
///
/// Drivers that lose an axis mid-read return fewer values; that is still a
/// `StageReading`, it just never becomes a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReading(pub Vec<f64>);

impl StageReading {
    /// Reading with all five axes present
    pub fn complete(x: f64, y: f64, z: f64, alpha_tilt: f64, beta_tilt: f64) -> Self {
        Self(vec![x, y, z, alpha_tilt, beta_tilt])
    }

    /// Values reported so far
    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

impl From<[f64; AXIS_COUNT]> for StageReading {
    fn from(values: [f64; AXIS_COUNT]) -> Self {
        Self(values.to_vec())
    }
}

/// One timestamped, fully populated stage position
///
/// Timestamps are truncated to millisecond precision on construction so the
/// persisted text form carries the whole value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub timestamp: DateTime<FixedOffset>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub alpha_tilt: f64,
    pub beta_tilt: f64,
}

impl PositionSample {
    /// Build a sample from a raw reading, rejecting partial or non-finite data
    pub fn from_reading(
        timestamp: DateTime<FixedOffset>,
        reading: &StageReading,
    ) -> Result<Self, IncompleteReading> {
        let values: [f64; AXIS_COUNT] =
            reading
                .values()
                .try_into()
                .map_err(|_| IncompleteReading::WrongArity {
                    expected: AXIS_COUNT,
                    got: reading.values().len(),
                })?;

        if let Some((axis, value)) = AXIS_NAMES
            .into_iter()
            .zip(values)
            .find(|(_, value)| !value.is_finite())
        {
            return Err(IncompleteReading::NonFinite { axis, value });
        }

        let [x, y, z, alpha_tilt, beta_tilt] = values;
        Ok(Self {
            timestamp: timestamp.trunc_subsecs(3),
            x,
            y,
            z,
            alpha_tilt,
            beta_tilt,
        })
    }

    /// Copy of this sample stamped with a different instant
    pub fn with_timestamp(self, timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(3),
            ..self
        }
    }

    /// Axis values in driver order
    pub fn axes(&self) -> [f64; AXIS_COUNT] {
        [self.x, self.y, self.z, self.alpha_tilt, self.beta_tilt]
    }
}
