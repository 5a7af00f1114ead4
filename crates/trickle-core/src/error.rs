//! Error types for trickle-core

use thiserror::Error;

/// Result type alias for trickle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the trickle HTTP server
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid HTTP method
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Invalid path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Listen address could not be parsed
    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),
}
