//! Error types for thinkgate

use thiserror::Error;

/// Main error type for thinkgate operations
#[derive(Error, Debug)]
pub enum ThinkgateError {
    /// Configuration errors (bad file, bad address, invalid values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream inference server errors (unreachable, non-success status)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Proxy/HTTP errors
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ThinkgateError {
    fn from(e: serde_json::Error) -> Self {
        ThinkgateError::Serialization(e.to_string())
    }
}

/// Result type alias for thinkgate operations
pub type Result<T> = std::result::Result<T, ThinkgateError>;
