//! # Stage Logger
//!
//! Samples the microscope stage position at a fixed interval and appends each
//! complete reading to a durable CSV log.
//!
//! ## Components
//!
//! - [`configurator`]: resolves path and interval, runs the operator menu and
//!   confirmation gate.
//! - [`sampler`]: the interval-paced loop and its lifecycle.
//! - [`shutdown`]: Ctrl+C to cooperative stop.
//! - [`session`]: per-run parameters and counters.
//!
//! ## Data Flow
//!
//! ```text
//! Configurator ─(path, interval)─▶ SamplingLoop ─read─▶ InstrumentAdapter
//!                                       │
//!                                       └─append─▶ RecordSink ─▶ CSV file
//! ShutdownController ─(stop flag)─▶ SamplingLoop
//! ```

pub mod configurator;
pub mod error;
pub mod sampler;
pub mod session;
pub mod shutdown;

pub use configurator::{
    check_directory, parse_interval, resolve_initial, step, Console, DirectoryStatus, MenuState,
    Notice, SessionArgs, SessionDraft, Step,
};
pub use error::ConfigurationError;
pub use sampler::{
    LoopState, Outcome, SamplerSettings, SamplingLoop, SessionReport, SessionStats,
    StatsSnapshot, TeardownReport,
};
pub use session::{LogSession, SessionLimits};
pub use shutdown::{ShutdownController, StopHandle};
