use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Errors produced while admitting, running or awaiting a task.
///
/// Cloneable so a single terminal outcome can be handed to every caller
/// awaiting the same task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to spawn worker: {0}")]
    WorkerSpawnFailure(String),

    #[error("Worker execution error: {0}")]
    WorkerExecutionError(String),

    #[error("Task timed out after {}ms", .0.as_millis())]
    WorkerTimeout(Duration),

    #[error("Pool exhausted: {active} running, {queued} queued")]
    PoolExhausted { active: usize, queued: usize },

    #[error("Task cancelled")]
    Cancelled,

    #[error("Dispatcher is not running")]
    DispatcherClosed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    WorkerSpawnFailure,
    WorkerExecutionError,
    WorkerTimeout,
    PoolExhausted,
    Cancelled,
    DispatcherClosed,
    InvalidConfig,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::WorkerSpawnFailure => "worker_spawn_failure",
            ErrorKind::WorkerExecutionError => "worker_execution_error",
            ErrorKind::WorkerTimeout => "worker_timeout",
            ErrorKind::PoolExhausted => "pool_exhausted",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::DispatcherClosed => "dispatcher_closed",
            ErrorKind::InvalidConfig => "invalid_config",
        }
    }

    /// Whether the caller may reasonably retry the same submission later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::PoolExhausted)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::WorkerSpawnFailure(_) => ErrorKind::WorkerSpawnFailure,
            Error::WorkerExecutionError(_) => ErrorKind::WorkerExecutionError,
            Error::WorkerTimeout(_) => ErrorKind::WorkerTimeout,
            Error::PoolExhausted { .. } => ErrorKind::PoolExhausted,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::DispatcherClosed => ErrorKind::DispatcherClosed,
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = Error::InvalidInput("bound must be non-negative".into());
        assert_eq!(
            error.to_string(),
            "Invalid input: bound must be non-negative"
        );

        let error = Error::WorkerTimeout(Duration::from_millis(1500));
        assert_eq!(error.to_string(), "Task timed out after 1500ms");

        let error = Error::PoolExhausted {
            active: 2,
            queued: 4,
        };
        assert_eq!(error.to_string(), "Pool exhausted: 2 running, 4 queued");

        let error = Error::Cancelled;
        assert_eq!(error.to_string(), "Task cancelled");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::InvalidInput("x".into()).kind().code(),
            "invalid_input"
        );
        assert_eq!(
            Error::WorkerTimeout(Duration::from_secs(1)).kind().code(),
            "worker_timeout"
        );
        assert!(Error::PoolExhausted {
            active: 1,
            queued: 0
        }
        .kind()
        .is_retryable());
        assert!(!Error::WorkerExecutionError("boom".into())
            .kind()
            .is_retryable());

        let json = serde_json::to_string(&ErrorKind::WorkerSpawnFailure).unwrap();
        assert_eq!(json, "\"worker_spawn_failure\"");
    }
}
