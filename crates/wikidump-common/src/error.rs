//! Error types for the shared utilities

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised by the shared utilities
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Logging error: {0}")]
    Logging(String),
}
