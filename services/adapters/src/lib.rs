//! # Instrument Adapters
//!
//! The boundary between the stage logger and the microscope hardware.
//!
//! - [`InstrumentAdapter`]: async `connect` / `read_position` / `disconnect`
//!   contract. Reads return a raw [`StageReading`](stage_types::StageReading)
//!   that may be partial; turning it into a sample is the caller's job.
//! - [`SimulatedStage`]: seeded random-walk driver with configurable latency
//!   and fault injection, selected with `instrument.driver = "simulated"`.
//! - [`test_utils::ScriptedInstrument`]: replays a fixed script and records
//!   every call, for loop tests.
//!
//! ```rust
//! use instrument_adapters::build_instrument;
//! use stage_config::InstrumentConfig;
//!
//! let instrument = build_instrument(&InstrumentConfig::default()).unwrap();
//! assert!(instrument.describe().starts_with("simulated"));
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod instrument;
pub mod simulated;
#[allow(missing_docs)]
pub mod test_utils;

pub use error::{AdapterError, Result};
pub use instrument::{build_instrument, ConnectionState, InstrumentAdapter, AVAILABLE_DRIVERS};
pub use simulated::SimulatedStage;
