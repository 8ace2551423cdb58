//! Stock ledger: a fast atomic counter store keyed by product.
//!
//! The ledger answers the admission question ("may this request take `qty`
//! units?") with a single atomic check-and-decrement, eliminating the
//! read-then-write race that oversells stock. It is a derived mirror of the
//! authoritative store and never more authoritative than the settlement
//! reconciliation rules allow.

mod error;
mod memory;
mod redis;

use async_trait::async_trait;
use common::ProductId;

pub use error::{LedgerError, Result};
pub use memory::InMemoryStockLedger;
pub use self::redis::RedisStockLedger;

/// Atomic per-product stock counters.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Sets a product's counter unconditionally from the system of record.
    ///
    /// Overwrites the effect of any in-flight reservations; callers must
    /// guarantee no concurrent buying is occurring (operational
    /// precondition, not enforced here).
    async fn initialize(&self, product_id: ProductId, qty: i64) -> Result<()>;

    /// Atomically decrements if at least `qty` units remain.
    ///
    /// Returns `true` on success. On `false` nothing was mutated. This must
    /// be a single atomic operation end to end: two concurrent callers
    /// requesting the last unit must not both succeed.
    async fn decrement_if_available(&self, product_id: ProductId, qty: u32) -> Result<bool>;

    /// Atomically adds units back. A missing counter counts as zero.
    async fn increment(&self, product_id: ProductId, qty: u32) -> Result<()>;

    /// Current counter value, for display only. A missing counter reads zero.
    async fn read(&self, product_id: ProductId) -> Result<i64>;

    /// Whether a counter exists for the product.
    async fn contains(&self, product_id: ProductId) -> Result<bool>;
}
