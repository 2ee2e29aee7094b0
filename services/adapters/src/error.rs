//! Error types for instrument adapters

use std::time::Duration;
use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Main error type for adapter operations
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The instrument could not be reached or refused the session
    #[error("Connection failed for {instrument}: {reason}")]
    ConnectionFailed {
        /// The instrument that failed to connect
        instrument: String,
        /// Reason for the failure
        reason: String,
    },

    /// A read or disconnect was issued without an open connection
    #[error("Instrument {0} is not connected")]
    NotConnected(String),

    /// The position query failed
    #[error("Position read failed: {0}")]
    ReadFailed(String),

    /// The call did not complete in time
    #[error("{operation} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// What was being attempted
        operation: &'static str,
        /// Bound that was exceeded
        timeout: Duration,
    },

    /// Configuration error in driver settings
    #[error("Configuration error: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failure_names_instrument() {
        let err = AdapterError::ConnectionFailed {
            instrument: "simulated".into(),
            reason: "refused".into(),
        };
        assert_eq!(err.to_string(), "Connection failed for simulated: refused");
    }

    #[test]
    fn test_timeout_message() {
        let err = AdapterError::Timeout {
            operation: "connect",
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "connect timed out after 1500ms");
    }
}
