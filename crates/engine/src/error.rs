// Error types for the task distribution engine

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised synchronously to the caller of the engine API
#[derive(Debug, Error)]
pub enum EngineError {
    /// The coordinator has been permanently stopped
    #[error("engine has been stopped")]
    Stopped,

    /// The call would mutate state that workers are currently using
    #[error("operation not permitted while processing is in progress")]
    InProgress,

    /// `start()` was called before any task function was configured
    #[error("no task function configured")]
    NoFunction,

    /// The active pool did not drain within the allowed time
    #[error("worker pool did not drain within {0:?}")]
    DrainTimeout(Duration),

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The OS refused to spawn a thread
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// How a task failed inside a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// The task function returned an error
    Failed,

    /// The task function panicked; the worker caught it and kept running
    Panicked,
}

impl std::fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed => write!(f, "failed"),
            Self::Panicked => write!(f, "panicked"),
        }
    }
}

/// Error-tagged task result
///
/// Delivered through the normal result stream so the caller can decide
/// whether to retry, log or abort. The engine never retries on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskError {
    /// Error message
    pub message: String,

    /// Failure kind
    pub kind: TaskErrorKind,
}

impl TaskError {
    /// Create an error for a task function that returned a failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TaskErrorKind::Failed,
        }
    }

    /// Create an error for a task function that panicked
    pub fn panicked(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TaskErrorKind::Panicked,
        }
    }

    /// Whether the failure came from a panic
    pub fn is_panic(&self) -> bool {
        self.kind == TaskErrorKind::Panicked
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task {}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TaskError {}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self::failed(message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::failed(message)
    }
}

/// Outcome of running the task function on a single task
pub type TaskOutcome<R> = std::result::Result<R, TaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_constructors() {
        let err = TaskError::failed("bad input");
        assert_eq!(err.kind, TaskErrorKind::Failed);
        assert!(!err.is_panic());

        let err = TaskError::panicked("index out of bounds");
        assert!(err.is_panic());
        assert_eq!(err.to_string(), "task panicked: index out of bounds");
    }

    #[test]
    fn test_task_error_from_str() {
        let err: TaskError = "boom".into();
        assert_eq!(err, TaskError::failed("boom"));
    }

    #[test]
    fn test_task_error_serialization() {
        let err = TaskError::panicked("oops");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"panicked\""));
        let parsed: TaskError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, err);
    }

    #[test]
    fn test_engine_error_display() {
        assert_eq!(EngineError::Stopped.to_string(), "engine has been stopped");
        assert_eq!(
            EngineError::DrainTimeout(Duration::from_millis(250)).to_string(),
            "worker pool did not drain within 250ms"
        );
    }
}
