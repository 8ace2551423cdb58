//! Engine error taxonomy.

use common::{HoldId, ProductId};
use domain::DomainError;
use ledger::LedgerError;
use locks::LockError;
use store::StoreError;
use thiserror::Error;

/// Errors surfaced by the reservation and settlement operations.
///
/// Internal races (hold already reclaimed, order already terminal) are not
/// errors; they are absorbed as no-op dispositions by the components.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The hold does not exist.
    #[error("Hold not found: {0}")]
    HoldNotFound(HoldId),

    /// No order matches the given reference or id.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Admission denied: not enough stock remains.
    #[error("Insufficient stock for product {product_id} (requested {requested})")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
    },

    /// The hold's deadline passed before conversion.
    #[error("Hold {0} has expired")]
    HoldExpired(HoldId),

    /// The webhook signature did not verify. No state was changed.
    #[error("Webhook signature is invalid")]
    SignatureInvalid,

    /// Lock contention exceeded the wait budget. Retryable.
    #[error("Timed out waiting for lock '{0}'")]
    LockTimeout(String),

    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The store or ledger is unreachable; the operation failed with no
    /// partial mutation. Retryable.
    #[error("Dependency unavailable: {0}")]
    Dependency(String),
}

impl EngineError {
    /// Whether the caller may safely retry the operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::LockTimeout(_) | EngineError::Dependency(_)
        )
    }
}

impl From<LockError> for EngineError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Timeout { name } => EngineError::LockTimeout(name),
            LockError::Backend(message) => EngineError::Dependency(message),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Dependency(e.to_string())
    }
}

impl From<LedgerError> for EngineError {
    fn from(e: LedgerError) -> Self {
        EngineError::Dependency(e.to_string())
    }
}
