//! Task fabric errors

use thiserror::Error;

/// Result type for task operations
pub type Result<T> = std::result::Result<T, TaskError>;

/// Errors produced by task handlers and the fabric itself
#[derive(Debug, Error)]
pub enum TaskError {
    /// Transient failure; the task is retried until attempts run out
    #[error("Retryable task failure: {0}")]
    Retryable(String),

    /// Permanent failure; the task goes straight to the dead letter
    #[error("Fatal task failure: {0}")]
    Fatal(String),

    /// No handler registered for a task kind
    #[error("Unknown task kind: {0}")]
    UnknownKind(String),

    /// Payload could not be decoded
    #[error("Task payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Broker-level failure (queue unavailable)
    #[error("Broker error: {0}")]
    Broker(String),
}

impl TaskError {
    /// Whether the fabric should schedule another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Retryable(_) | TaskError::Broker(_))
    }

    /// Wrap an HTTP transport error as retryable
    pub fn transport(err: reqwest::Error) -> Self {
        TaskError::Retryable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(TaskError::Retryable("x".into()).is_retryable());
        assert!(!TaskError::Fatal("x".into()).is_retryable());
        assert!(!TaskError::UnknownKind("x".into()).is_retryable());
    }
}
