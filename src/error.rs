//! Error types for minutecount.

use thiserror::Error;

/// Main error type for minutecount operations.
#[derive(Error, Debug)]
pub enum CounterError {
    /// A caller passed an argument the engine cannot act on
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed ingest input
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for minutecount operations.
pub type Result<T> = std::result::Result<T, CounterError>;
