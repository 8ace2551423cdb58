//! Cross-process mutual exclusion keyed by resource name.
//!
//! Leases are TTL-bounded so a crashed holder cannot wedge the system, and
//! acquisition waits are bounded so contention surfaces as a retryable
//! timeout instead of an unbounded stall. Guards release on drop, which
//! covers every exit path of a critical section including early returns and
//! errors.
//!
//! Lock names used by the engine:
//! - `hold:{product_id}` — hold creation per product
//! - `hold-entry:{hold_id}` — hold conversion vs. expiry reclamation
//! - `order:{reference}` / `order:{order_id}` — order settlement
//! - `webhook:{idempotency_key}` — webhook application
//! - `holds:sweep` — the singleton expiry sweep

mod error;
mod memory;
mod redis;

use std::time::Duration;

use async_trait::async_trait;

pub use error::{LockError, Result};
pub use memory::{InMemoryLockCoordinator, InMemoryLockGuard};
pub use self::redis::{RedisLockCoordinator, RedisLockGuard};

/// Factory for named, TTL-bounded leases.
///
/// Repeated calls with the same name contend for the same logical lock.
/// A lease lasts until its guard drops or its TTL elapses, whichever comes
/// first; an expired lease is silently overtaken and its stale guard must
/// not release the successor.
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// The guard type; dropping it releases the lease.
    type Guard: Send;

    /// Acquires the named lease, waiting up to `wait`.
    ///
    /// Fails with [`LockError::Timeout`] when contention exceeds the wait
    /// budget — the caller must treat that as retryable, not as a rejection.
    async fn acquire(&self, name: &str, ttl: Duration, wait: Duration) -> Result<Self::Guard>;

    /// Attempts the named lease without waiting.
    async fn try_acquire(&self, name: &str, ttl: Duration) -> Result<Option<Self::Guard>>;
}
