//! The instrument boundary the sampling loop talks to

use crate::simulated::SimulatedStage;
use crate::{AdapterError, Result};
use async_trait::async_trait;
use stage_config::InstrumentConfig;
use stage_types::StageReading;

/// Driver names accepted by [`build_instrument`]
pub const AVAILABLE_DRIVERS: &[&str] = &["simulated"];

/// Connection lifecycle of an instrument link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Disconnected,
    /// Link established, reads allowed
    Connected,
    /// Connection attempt failed
    Failed,
}

/// Core trait for stage position sources
///
/// Every call returns a tagged result; implementations must not panic on
/// hardware errors. `read_position` may return fewer than five values when an
/// axis drops out, which the caller treats as an incomplete reading.
#[async_trait]
pub trait InstrumentAdapter: Send {
    /// Open the link to the instrument
    async fn connect(&mut self) -> Result<()>;

    /// Query the current `x, y, z, alpha, beta` position
    async fn read_position(&mut self) -> Result<StageReading>;

    /// Release the link (no-op when already disconnected)
    async fn disconnect(&mut self) -> Result<()>;

    /// Current connection state
    fn connection_state(&self) -> ConnectionState;

    /// Short human-readable identification for logs
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: InstrumentAdapter + ?Sized> InstrumentAdapter for Box<T> {
    async fn connect(&mut self) -> Result<()> {
        (**self).connect().await
    }

    async fn read_position(&mut self) -> Result<StageReading> {
        (**self).read_position().await
    }

    async fn disconnect(&mut self) -> Result<()> {
        (**self).disconnect().await
    }

    fn connection_state(&self) -> ConnectionState {
        (**self).connection_state()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Build the driver named in `config.driver`
pub fn build_instrument(config: &InstrumentConfig) -> Result<Box<dyn InstrumentAdapter>> {
    match config.driver.as_str() {
        "simulated" => Ok(Box::new(SimulatedStage::new(config.simulated.clone())?)),
        other => Err(AdapterError::Configuration(format!(
            "Unknown instrument driver '{}' (available: {})",
            other,
            AVAILABLE_DRIVERS.join(", ")
        ))),
    }
}
