//! # Stage Logger Configuration
//!
//! Layered run configuration for the stage logger: built-in defaults, then an
//! optional TOML file, then `STAGE_LOGGER_*` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stage_config::LoggerConfig;
//!
//! // Uses ./stage_logger.toml when present, defaults otherwise
//! let config = LoggerConfig::load(None)?;
//! println!("logging every {:?}", config.sampling.interval());
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Environment overrides use `__` between section and key:
//!
//! ```text
//! STAGE_LOGGER_SAMPLING__INTERVAL_SECS=0.5
//! STAGE_LOGGER_OUTPUT__PATH=$HOME/stage/positions.csv
//! ```

pub mod logger_config;

pub use logger_config::{
    InstrumentConfig, LoggerConfig, LoggingConfig, OutputConfig, SamplingConfig,
    SimulatedStageConfig, DEFAULT_CONFIG_FILE, DEFAULT_INTERVAL_SECS, DEFAULT_OUTPUT_PATH,
    ENV_PREFIX,
};
