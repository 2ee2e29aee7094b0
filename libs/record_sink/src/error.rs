use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Invalid output path: {0}")]
    InvalidPath(String),

    #[error("I/O error during {operation} on {path:?}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Sink closed")]
    Closed,

    #[error("Other error: {0}")]
    Other(String),
}

impl SinkError {
    /// Wrap an I/O failure with the operation and file it concerned
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SinkError::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Check if a later append could still succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SinkError::Io { .. } | SinkError::Other(_))
    }
}
