//! Hold creation and expiry reclamation.

use std::time::Duration;

use chrono::Utc;
use common::ProductId;
use domain::{DomainError, Hold};
use locks::LockCoordinator;
use store::StockStore;

use crate::cache::ProductSnapshotCache;
use crate::error::EngineError;

/// Name of the singleton lease guarding the expiry sweep.
const SWEEP_LOCK: &str = "holds:sweep";

/// The sweep lease outlives one sweep pass, so a crashed sweeper is
/// eventually overtaken.
const SWEEP_LOCK_TTL: Duration = Duration::from_secs(120);

/// Creates short-lived reservations against a product's committed stock and
/// reclaims the abandoned ones.
///
/// A hold debits the authoritative store at creation time; while it exists
/// its quantity has been subtracted from availability exactly once.
#[derive(Clone)]
pub struct HoldManager<S, L: LockCoordinator> {
    store: S,
    locks: L,
    cache: ProductSnapshotCache,
    hold_ttl: chrono::Duration,
    lock_wait: Duration,
}

impl<S, L> HoldManager<S, L>
where
    S: StockStore + Clone,
    L: LockCoordinator + Clone,
{
    /// Creates a hold manager.
    pub fn new(
        store: S,
        locks: L,
        cache: ProductSnapshotCache,
        hold_ttl: chrono::Duration,
        lock_wait: Duration,
    ) -> Self {
        Self {
            store,
            locks,
            cache,
            hold_ttl,
            lock_wait,
        }
    }

    /// Reserves `qty` units of a product for a bounded checkout window.
    ///
    /// Serialized per product; rejects with `NotFound` for an unknown
    /// product and `InsufficientStock` when fewer than `qty` units remain.
    #[tracing::instrument(skip(self))]
    pub async fn create_hold(&self, product_id: ProductId, qty: u32) -> Result<Hold, EngineError> {
        if qty == 0 {
            return Err(DomainError::InvalidQuantity(qty).into());
        }

        let _product_lock = self
            .locks
            .acquire(&format!("hold:{product_id}"), self.lock_wait, self.lock_wait)
            .await?;

        let product = match self.cache.get(product_id) {
            Some(product) => product,
            None => self
                .store
                .product(product_id)
                .await?
                .ok_or(EngineError::ProductNotFound(product_id))?,
        };

        if product.stock < i64::from(qty) {
            metrics::counter!("holds_rejected_total").increment(1);
            return Err(EngineError::InsufficientStock {
                product_id,
                requested: qty,
            });
        }

        // The snapshot may lag the store; the conditional debit is what
        // actually guards availability.
        if !self.store.debit_stock_if_available(product_id, qty).await? {
            self.cache.invalidate(product_id);
            metrics::counter!("holds_rejected_total").increment(1);
            return Err(EngineError::InsufficientStock {
                product_id,
                requested: qty,
            });
        }

        let hold = Hold::new(product_id, qty, self.hold_ttl, Utc::now())?;
        self.store.insert_hold(hold.clone()).await?;

        // refresh the snapshot only after the debit committed
        self.cache.invalidate(product_id);
        if let Some(updated) = self.store.product(product_id).await? {
            self.cache.put(updated);
        }

        metrics::counter!("holds_created_total").increment(1);
        tracing::info!(
            hold_id = %hold.id,
            %product_id,
            qty,
            expire_at = %hold.expire_at,
            "hold created"
        );

        Ok(hold)
    }

    /// Reclaims every hold whose deadline has passed, restoring its quantity
    /// to the authoritative stock.
    ///
    /// Only one sweeper runs at a time; a concurrent invocation skips with a
    /// released count of zero. A hold that disappears between listing and
    /// locking was converted in the meantime and is skipped silently.
    #[tracing::instrument(skip(self))]
    pub async fn release_expired(&self) -> Result<u64, EngineError> {
        let Some(_sweep) = self.locks.try_acquire(SWEEP_LOCK, SWEEP_LOCK_TTL).await? else {
            tracing::warn!("expired-hold sweep skipped, another sweeper is running");
            return Ok(0);
        };

        let now = Utc::now();
        let expired = self.store.expired_holds(now).await?;

        let mut released = 0u64;
        for candidate in expired {
            let _entry_lock = self
                .locks
                .acquire(
                    &format!("hold-entry:{}", candidate.id),
                    self.lock_wait,
                    self.lock_wait,
                )
                .await?;

            // re-check under the lock; a conversion may have won the race
            let Some(hold) = self.store.remove_hold(candidate.id).await? else {
                continue;
            };

            self.store.credit_stock(hold.product_id, hold.qty).await?;
            self.cache.invalidate(hold.product_id);
            released += 1;

            tracing::info!(
                hold_id = %hold.id,
                product_id = %hold.product_id,
                qty_restored = hold.qty,
                expired_at = %hold.expire_at,
                "expired hold released, stock restored"
            );
        }

        if released > 0 {
            metrics::counter!("holds_released_total").increment(released);
            tracing::info!(total_released = released, "expired holds cleanup completed");
        }

        Ok(released)
    }
}
