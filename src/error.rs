//! Error types for bb-runner
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::domain::PayloadError;

/// All error types that can occur in the runner
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Run not found in the store
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// Job not found in the store
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// A persisted value could not be interpreted
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// SQLite error from the job store
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Job payload could not be decoded
    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    /// Git worktree error
    #[error("Worktree error: {0}")]
    Worktree(String),

    /// Outcome callback delivery error
    #[error("Report error: {0}")]
    Report(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;
