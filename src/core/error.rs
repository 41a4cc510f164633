//! Error types for keystone

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A structural invariant does not hold. Reported by validation only;
    /// mutating operations panic instead.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Support worker has stopped")]
    WorkerStopped,

    #[error("Support worker failed: {0}")]
    WorkerFailed(String),
}
