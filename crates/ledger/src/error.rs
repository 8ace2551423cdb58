use thiserror::Error;

/// Errors that can occur when talking to the ledger backend.
///
/// Any error here means the ledger is unreachable or misbehaving; callers
/// must fail the admission attempt rather than fall back to a racy read.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The backing counter store failed.
    #[error("Ledger backend error: {0}")]
    Backend(#[from] redis::RedisError),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
