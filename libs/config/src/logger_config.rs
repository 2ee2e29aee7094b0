//! Logger Configuration Module
//!
//! Loads the stage logger's run configuration from an optional TOML file with
//! environment variable overrides, the same layering the service configs use.

use anyhow::{Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Config file picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "stage_logger.toml";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "STAGE_LOGGER";

/// Sampling interval used when nothing else is configured
pub const DEFAULT_INTERVAL_SECS: f64 = 0.1;

/// Output file used when nothing else is configured
#[cfg(windows)]
pub const DEFAULT_OUTPUT_PATH: &str = r"C:\jeol_dnr\SynergyED_stage_pos_log.csv";
#[cfg(not(windows))]
pub const DEFAULT_OUTPUT_PATH: &str = "logs/stage_pos_log.csv";

/// Complete logger configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggerConfig {
    pub output: OutputConfig,
    pub sampling: SamplingConfig,
    pub instrument: InstrumentConfig,
    pub logging: LoggingConfig,
}

/// Where samples are written
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub path: String,
}

/// Loop pacing and failure thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Seconds between acquisitions
    pub interval_secs: f64,
    /// Emit a throughput observation every N accepted samples
    pub report_every: u64,
    /// Consecutive write failures tolerated before the session aborts
    pub max_consecutive_write_failures: u32,
    /// Upper bound on a single position read
    pub read_timeout_ms: u64,
}

/// Instrument driver selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Driver name; only `simulated` ships with the logger
    pub driver: String,
    /// Upper bound on connect and disconnect calls
    pub connect_timeout_ms: u64,
    pub simulated: SimulatedStageConfig,
}

/// Parameters of the simulated stage driver
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulatedStageConfig {
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
    /// Artificial latency added to every read
    pub latency_ms: u64,
    /// Probability that a read fails outright
    pub failure_rate: f64,
    /// Probability that a read comes back with missing axes
    pub partial_rate: f64,
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_OUTPUT_PATH.to_string(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            report_every: 10,
            max_consecutive_write_failures: 3,
            read_timeout_ms: 2000,
        }
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            driver: "simulated".to_string(),
            connect_timeout_ms: 10000,
            simulated: SimulatedStageConfig::default(),
        }
    }
}

impl Default for SimulatedStageConfig {
    fn default() -> Self {
        Self {
            seed: None,
            latency_ms: 5,
            failure_rate: 0.0,
            partial_rate: 0.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggerConfig {
    /// Load configuration from file with environment overrides
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`] is
    /// used if present in the working directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                info!("Loading logger config: {:?}", path);
                builder = builder.add_source(File::from(path).required(true));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                info!("Loading logger config: {}", DEFAULT_CONFIG_FILE);
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
            }
            None => debug!("No config file, using defaults"),
        }

        // Override with environment variables (STAGE_LOGGER_ prefix)
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: LoggerConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.expand_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables in path values
    pub fn expand_env_vars(&mut self) -> Result<()> {
        let expanded =
            shellexpand::env(&self.output.path).context("Failed to expand output path")?;
        self.output.path = expanded.to_string();
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.output.path.trim().is_empty() {
            return Err(anyhow::anyhow!("Output path cannot be empty"));
        }

        if nonzero_duration(self.sampling.interval_secs).is_none() {
            return Err(anyhow::anyhow!(
                "Sampling interval must be a positive duration of at least 1ns, got {}",
                self.sampling.interval_secs
            ));
        }

        if self.sampling.report_every == 0 {
            return Err(anyhow::anyhow!("report_every must be greater than 0"));
        }

        if self.sampling.max_consecutive_write_failures == 0 {
            return Err(anyhow::anyhow!(
                "max_consecutive_write_failures must be greater than 0"
            ));
        }

        if self.sampling.read_timeout_ms == 0 || self.instrument.connect_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Timeouts must be greater than 0"));
        }

        for (name, rate) in [
            ("failure_rate", self.instrument.simulated.failure_rate),
            ("partial_rate", self.instrument.simulated.partial_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(anyhow::anyhow!("{} must be within [0, 1], got {}", name, rate));
            }
        }

        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Seconds as a duration, if finite, positive and at least 1ns
fn nonzero_duration(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
}

impl SamplingConfig {
    /// Configured interval as a duration, never zero
    ///
    /// Values that do not convert to a non-zero duration fall back to
    /// [`DEFAULT_INTERVAL_SECS`].
    pub fn interval(&self) -> Duration {
        nonzero_duration(self.interval_secs).unwrap_or(DEFAULT_INTERVAL)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl InstrumentConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
