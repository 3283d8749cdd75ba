//! Error Handling
//!
//! Application-level error type for the storage and service layers.
//! Uses thiserror for ergonomic error definitions.

use control_relay_core::CoreError;
use thiserror::Error;

use crate::services::remote::{RemoteError, StartError, StopError};

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors surfaced by the shared core crate
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Transport errors from the messaging adapter
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Start failed: {0}")]
    Start(#[from] StartError),

    #[error("Stop failed: {0}")]
    Stop(#[from] StopError),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<AppError> for CoreError {
    fn from(err: AppError) -> CoreError {
        match err {
            AppError::Core(inner) => inner,
            AppError::Io(inner) => CoreError::Io(inner),
            AppError::Serialization(inner) => CoreError::Serialization(inner),
            other => CoreError::config(other.to_string()),
        }
    }
}
