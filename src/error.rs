// Error types for the dispatcher and the configuration layer.
//
// The web boundary converts these into flash messages or JSON bodies; nothing
// here is allowed to take the process down.

use std::path::PathBuf;
use thiserror::Error;

/// Failures of a single dispatcher call
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Unable to read image at {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("{name} not found (searched: {searched:?})")]
    MissingResource { name: String, searched: Vec<PathBuf> },

    #[error("Invalid cascade model {}: {reason}", path.display())]
    InvalidCascade { path: PathBuf, reason: String },

    #[error("{operation} failed: {reason}")]
    Transform { operation: String, reason: String },

    #[error("Failed to write output image {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },
}

impl ProcessingError {
    /// Short machine-readable kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessingError::Load { .. } => "load",
            ProcessingError::UnsupportedOperation(_) => "unsupported_operation",
            ProcessingError::MissingResource { .. } => "missing_resource",
            ProcessingError::InvalidCascade { .. } => "invalid_cascade",
            ProcessingError::Transform { .. } => "transform",
            ProcessingError::Write { .. } => "write",
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Port must be > 0")]
    InvalidPort,

    #[error("Maximum content length must be > 0, got {0}")]
    InvalidContentLength(usize),

    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
