use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors for queue operations
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Queue is closed")]
    Closed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Create a backend error from anything displayable
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Handler outcome - determines retry behavior
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Retryable error - the message is re-scheduled while retries remain
    #[error("{0}")]
    Retryable(String),

    /// Permanent error - dead-letter immediately, no retry
    #[error("{0}")]
    Permanent(String),
}

impl HandlerError {
    /// Create a retryable error
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    /// Create a permanent error
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Permanent(msg) => msg,
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
