use common::OrderReference;
use thiserror::Error;

/// Errors that can occur when interacting with the authoritative store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An order with this reference already exists (unique constraint).
    #[error("Order reference already exists: {0}")]
    DuplicateReference(OrderReference),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be decoded into its domain type.
    #[error("Invalid row data: {0}")]
    InvalidRow(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
