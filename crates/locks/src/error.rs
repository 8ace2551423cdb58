use thiserror::Error;

/// Errors raised by lock acquisition.
#[derive(Debug, Error)]
pub enum LockError {
    /// Contention exceeded the wait budget. Retryable.
    #[error("Timed out waiting for lock '{name}'")]
    Timeout { name: String },

    /// The lease backend failed.
    #[error("Lock backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for LockError {
    fn from(e: redis::RedisError) -> Self {
        LockError::Backend(e.to_string())
    }
}

/// Result type for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;
