//! Errors surfaced before any hardware interaction

use std::path::PathBuf;
use thiserror::Error;

/// Problems with the run parameters or the configuration file
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid interval '{input}': {reason}")]
    InvalidInterval { input: String, reason: String },

    #[error("Directory {path:?} is not writable: {reason}")]
    UnwritableDirectory { path: PathBuf, reason: String },

    #[error("Failed to load configuration: {0:#}")]
    Load(#[from] anyhow::Error),
}
