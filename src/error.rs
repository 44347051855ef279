//! Error types for the task stores and timer engine.

use crate::domain::TaskId;

/// Library error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No task with this id exists.
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    /// Rejected user input (empty name, zero goal).
    #[error("invalid task: {0}")]
    InvalidTask(String),

    /// Failure writing or reading a store file.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, Error>;
