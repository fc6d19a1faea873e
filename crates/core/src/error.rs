//! Error types for Runboard

use thiserror::Error;

/// Result type alias using Runboard Error
pub type Result<T> = std::result::Result<T, Error>;

/// Runboard error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("a run is already active; cancel it before starting another")]
    AlreadyRunning,

    #[error("no run is active")]
    NotRunning,

    #[error("failed to spawn test runner: {0}")]
    SpawnFailure(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("invalid scenario transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("operation timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}
