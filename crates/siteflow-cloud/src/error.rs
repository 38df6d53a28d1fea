//! Provider-facing error types

use thiserror::Error;

/// Errors shared by every provider
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found in state: {0}")]
    ResourceNotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Provider call failed; the message is passed through unchanged
    #[error("Provider API error: {0}")]
    ApiError(String),

    #[error("Invalid resource graph: {0}")]
    InvalidConfig(String),

    #[error("Resources reference each other in a cycle: {0}")]
    DependencyCycle(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("State is locked: {0}")]
    LockError(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
