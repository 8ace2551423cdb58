//! Order settlement: the `pending -> {paid, cancelled}` state machine and
//! the two admission flows feeding it.

use std::time::Duration;

use chrono::Utc;
use common::{HoldId, OrderReference, ProductId};
use domain::{Hold, Order, OrderKey, OrderStatus, PaymentOutcome, StockDebit};
use ledger::StockLedger;
use locks::LockCoordinator;
use store::{StockStore, StoreError};

use crate::cache::ProductSnapshotCache;
use crate::error::EngineError;

/// What applying a payment outcome did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The outcome was applied and moved the order to this terminal status.
    Applied(OrderStatus),
    /// The order was already terminal; nothing was mutated.
    AlreadyTerminal(OrderStatus),
}

impl Settlement {
    /// The order's status after this settlement attempt.
    pub fn status(&self) -> OrderStatus {
        match self {
            Settlement::Applied(status) | Settlement::AlreadyTerminal(status) => *status,
        }
    }
}

/// Converts holds and ledger-admitted reservations into orders and applies
/// payment outcomes.
///
/// Every order is permanently tagged with where its stock was debited
/// ([`StockDebit`]); settlement and compensation route stock back to that
/// origin only.
#[derive(Clone)]
pub struct OrderSettlement<S, G, L: LockCoordinator> {
    store: S,
    ledger: G,
    locks: L,
    cache: ProductSnapshotCache,
    lock_wait: Duration,
}

impl<S, G, L> OrderSettlement<S, G, L>
where
    S: StockStore + Clone,
    G: StockLedger + Clone,
    L: LockCoordinator + Clone,
{
    /// Creates a settlement service.
    pub fn new(
        store: S,
        ledger: G,
        locks: L,
        cache: ProductSnapshotCache,
        lock_wait: Duration,
    ) -> Self {
        Self {
            store,
            ledger,
            locks,
            cache,
            lock_wait,
        }
    }

    async fn lock(&self, name: String) -> Result<L::Guard, EngineError> {
        Ok(self
            .locks
            .acquire(&name, self.lock_wait, self.lock_wait)
            .await?)
    }

    /// Loads an order by either of its handles.
    pub async fn order(&self, key: &OrderKey) -> Result<Option<Order>, EngineError> {
        Ok(self.store.order(key).await?)
    }

    /// Converts a hold into a pending order, consuming the hold.
    ///
    /// Expiry is checked optimistically and again inside the per-hold lock;
    /// a hold that expired or vanished during the lock wait yields
    /// `HoldExpired` with no partial effects. The expired hold itself is
    /// left for the sweeper, which is the single place that credits expired
    /// stock back.
    #[tracing::instrument(skip(self))]
    pub async fn create_from_hold(&self, hold_id: HoldId) -> Result<Order, EngineError> {
        let hold = self
            .store
            .hold(hold_id)
            .await?
            .ok_or(EngineError::HoldNotFound(hold_id))?;
        if hold.is_expired(Utc::now()) {
            return Err(EngineError::HoldExpired(hold_id));
        }

        let _entry_lock = self.lock(format!("hold-entry:{hold_id}")).await?;

        // re-validate inside the lock to close the race window
        let hold: Hold = self
            .store
            .hold(hold_id)
            .await?
            .ok_or(EngineError::HoldExpired(hold_id))?;
        if hold.is_expired(Utc::now()) {
            return Err(EngineError::HoldExpired(hold_id));
        }

        let product = self
            .store
            .product(hold.product_id)
            .await?
            .ok_or(EngineError::ProductNotFound(hold.product_id))?;

        let order = Order::from_hold(&hold, product.price, Utc::now());

        // Both order handles are locked before the row exists so a webhook
        // addressing either one serializes against creation and the
        // pending-webhook rendezvous below cannot be missed.
        let _reference_lock = self.lock(format!("order:{}", order.reference)).await?;
        let _id_lock = self.lock(format!("order:{}", order.id)).await?;

        self.store.insert_order(order.clone()).await?;
        self.store.remove_hold(hold_id).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.id,
            order_reference = %order.reference,
            hold_id = %hold_id,
            amount = %order.amount,
            "order created from hold"
        );

        self.apply_pending_webhook(order).await
    }

    /// Creates the durable order for a reservation the ledger already
    /// admitted. Idempotent on the order reference: replays return the
    /// existing order without reprocessing.
    #[tracing::instrument(skip(self))]
    pub async fn create_from_reservation(
        &self,
        product_id: ProductId,
        qty: u32,
        reference: OrderReference,
    ) -> Result<Order, EngineError> {
        let _reference_lock = self.lock(format!("order:{reference}")).await?;

        let key = OrderKey::Reference(reference.clone());
        if let Some(existing) = self.store.order(&key).await? {
            tracing::debug!(order_reference = %reference, "reservation already processed");
            return Ok(existing);
        }

        let product = self
            .store
            .product(product_id)
            .await?
            .ok_or(EngineError::ProductNotFound(product_id))?;

        let order = Order::from_reservation(product_id, qty, reference, product.price, Utc::now())?;
        let _id_lock = self.lock(format!("order:{}", order.id)).await?;

        match self.store.insert_order(order.clone()).await {
            Ok(()) => {}
            // lost a cross-process race on the reference; the winner's row stands
            Err(StoreError::DuplicateReference(_)) => {
                return self
                    .store
                    .order(&key)
                    .await?
                    .ok_or_else(|| EngineError::OrderNotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.id,
            order_reference = %order.reference,
            %product_id,
            qty,
            "order created from reservation"
        );

        self.apply_pending_webhook(order).await
    }

    /// Applies a payment outcome to the order addressed by `key`.
    ///
    /// A terminal order yields `AlreadyTerminal` with no mutation. Outcome
    /// application always serializes on the order's reference lock, however
    /// the order was addressed, so concurrent appliers cannot interleave.
    #[tracing::instrument(skip(self))]
    pub async fn apply_payment_outcome(
        &self,
        key: &OrderKey,
        outcome: PaymentOutcome,
    ) -> Result<Settlement, EngineError> {
        let hint = self
            .store
            .order(key)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(key.to_string()))?;

        let _order_lock = self.lock(format!("order:{}", hint.reference)).await?;
        let order = self
            .store
            .order(&OrderKey::Id(hint.id))
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(key.to_string()))?;
        self.apply_outcome_locked(&order, outcome).await
    }

    /// Cancels pending orders older than `max_age`, releasing their stock
    /// to wherever it was debited from.
    #[tracing::instrument(skip(self))]
    pub async fn release_stale_orders(
        &self,
        max_age: chrono::Duration,
    ) -> Result<u64, EngineError> {
        let cutoff = Utc::now() - max_age;
        let stale = self.store.pending_orders_created_before(cutoff).await?;

        let mut cancelled = 0u64;
        for candidate in stale {
            let _order_lock = self.lock(format!("order:{}", candidate.reference)).await?;
            let Some(order) = self.store.order(&OrderKey::Id(candidate.id)).await? else {
                continue;
            };
            if order.status != OrderStatus::Pending {
                continue; // settled while we waited for the lock
            }
            self.apply_outcome_locked(&order, PaymentOutcome::Failure)
                .await?;
            cancelled += 1;
            tracing::info!(
                order_reference = %order.reference,
                product_id = %order.product_id,
                "stale unpaid order cancelled, stock restored"
            );
        }

        if cancelled > 0 {
            metrics::counter!("orders_reaped_total").increment(cancelled);
        }
        Ok(cancelled)
    }

    /// Applies the outcome assuming the caller holds the order's lock.
    ///
    /// On success the store is debited only for ledger-admitted orders (the
    /// paid-side accounting reconciliation). On failure stock is credited
    /// back to the origin recorded at creation.
    pub(crate) async fn apply_outcome_locked(
        &self,
        order: &Order,
        outcome: PaymentOutcome,
    ) -> Result<Settlement, EngineError> {
        if order.status.is_terminal() {
            return Ok(Settlement::AlreadyTerminal(order.status));
        }

        match outcome {
            PaymentOutcome::Success => {
                self.store
                    .set_order_status(order.id, OrderStatus::Paid)
                    .await?;
                if order.debit == StockDebit::Ledger {
                    // the ledger granted these units at admission time;
                    // settle the durable books to match
                    self.store.debit_stock(order.product_id, order.qty).await?;
                    self.cache.invalidate(order.product_id);
                }
                metrics::counter!("orders_paid_total").increment(1);
                tracing::info!(
                    order_reference = %order.reference,
                    amount = %order.amount,
                    "payment successful, order marked as paid"
                );
                Ok(Settlement::Applied(OrderStatus::Paid))
            }
            PaymentOutcome::Failure => {
                self.store
                    .set_order_status(order.id, OrderStatus::Cancelled)
                    .await?;
                match order.debit {
                    StockDebit::Ledger => {
                        self.ledger.increment(order.product_id, order.qty).await?;
                    }
                    StockDebit::Store => {
                        self.store.credit_stock(order.product_id, order.qty).await?;
                        self.cache.invalidate(order.product_id);
                    }
                }
                metrics::counter!("orders_cancelled_total").increment(1);
                tracing::info!(
                    order_reference = %order.reference,
                    product_id = %order.product_id,
                    qty_restored = order.qty,
                    "payment failed, order cancelled and stock released"
                );
                Ok(Settlement::Applied(OrderStatus::Cancelled))
            }
        }
    }

    /// The order-creation side of the two-sided rendezvous: applies a
    /// webhook that arrived before the order existed. Caller holds the
    /// order's locks.
    async fn apply_pending_webhook(&self, order: Order) -> Result<Order, EngineError> {
        let Some(record) = self.store.pending_webhook_for(&order).await? else {
            return Ok(order);
        };

        let settlement = self
            .apply_outcome_locked(&order, record.payload.outcome)
            .await?;
        self.store
            .mark_webhook_processed(&record.idempotency_key, settlement.status())
            .await?;

        metrics::counter!("webhooks_rendezvous_applied_total").increment(1);
        tracing::info!(
            order_reference = %order.reference,
            idempotency_key = %record.idempotency_key,
            outcome = %record.payload.outcome,
            "early webhook applied at order creation"
        );

        self.store
            .order(&OrderKey::Id(order.id))
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(order.id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{IdempotencyKey, Money};
    use domain::{Product, WebhookPayload, WebhookStatus};
    use ledger::{InMemoryStockLedger, StockLedger};
    use locks::InMemoryLockCoordinator;
    use store::InMemoryStockStore;

    use crate::holds::HoldManager;

    struct Harness {
        store: InMemoryStockStore,
        ledger: InMemoryStockLedger,
        holds: HoldManager<InMemoryStockStore, InMemoryLockCoordinator>,
        settlement: OrderSettlement<InMemoryStockStore, InMemoryStockLedger, InMemoryLockCoordinator>,
    }

    fn setup() -> Harness {
        let store = InMemoryStockStore::new();
        let ledger = InMemoryStockLedger::new();
        let locks = InMemoryLockCoordinator::new();
        let cache = ProductSnapshotCache::default();
        let lock_wait = Duration::from_secs(5);

        Harness {
            store: store.clone(),
            ledger: ledger.clone(),
            holds: HoldManager::new(
                store.clone(),
                locks.clone(),
                cache.clone(),
                chrono::Duration::minutes(2),
                lock_wait,
            ),
            settlement: OrderSettlement::new(store, ledger, locks, cache, lock_wait),
        }
    }

    async fn seed(harness: &Harness, stock: i64) -> Product {
        let product = Product::new("Test Item", Money::from_cents(1000), stock);
        harness.store.insert_product(product.clone()).await.unwrap();
        product
    }

    #[tokio::test]
    async fn hold_converts_into_pending_order() {
        let h = setup();
        let product = seed(&h, 10).await;

        let hold = h.holds.create_hold(product.id, 3).await.unwrap();
        let order = h.settlement.create_from_hold(hold.id).await.unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.debit, StockDebit::Store);
        assert_eq!(order.amount.cents(), 3000);
        assert_eq!(order.hold_id, Some(hold.id));

        // the hold is consumed, stock stays debited
        assert_eq!(h.store.hold_count().await, 0);
        assert_eq!(h.store.product(product.id).await.unwrap().unwrap().stock, 7);
    }

    #[tokio::test]
    async fn expired_hold_is_rejected_and_left_for_the_sweeper() {
        let h = setup();
        let product = seed(&h, 10).await;

        let hold = h.holds.create_hold(product.id, 2).await.unwrap();
        let mut expired = hold.clone();
        expired.expire_at = Utc::now() - chrono::Duration::minutes(1);
        h.store.remove_hold(hold.id).await.unwrap();
        h.store.insert_hold(expired).await.unwrap();

        let err = h.settlement.create_from_hold(hold.id).await.unwrap_err();
        assert!(matches!(err, EngineError::HoldExpired(_)));

        // no partial effects: the hold still exists for the sweeper
        assert_eq!(h.store.hold_count().await, 1);
        let released = h.holds.release_expired().await.unwrap();
        assert_eq!(released, 1);
        assert_eq!(h.store.product(product.id).await.unwrap().unwrap().stock, 10);
    }

    #[tokio::test]
    async fn missing_hold_is_not_found() {
        let h = setup();
        let err = h.settlement.create_from_hold(HoldId::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::HoldNotFound(_)));
    }

    #[tokio::test]
    async fn reservation_creation_is_idempotent_on_reference() {
        let h = setup();
        let product = seed(&h, 10).await;
        let reference = OrderReference::new("res-1");

        let first = h
            .settlement
            .create_from_reservation(product.id, 2, reference.clone())
            .await
            .unwrap();
        let second = h
            .settlement
            .create_from_reservation(product.id, 2, reference.clone())
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.debit, StockDebit::Ledger);
        assert_eq!(first.amount.cents(), 2000);
    }

    #[tokio::test]
    async fn amount_is_not_recomputed_after_creation() {
        let h = setup();
        let mut product = seed(&h, 10).await;
        let reference = OrderReference::new("res-price");

        let order = h
            .settlement
            .create_from_reservation(product.id, 2, reference.clone())
            .await
            .unwrap();
        assert_eq!(order.amount.cents(), 2000);

        // a price change after creation must not touch the recorded amount
        product.price = Money::from_cents(9999);
        h.store.insert_product(product).await.unwrap();

        let reloaded = h
            .settlement
            .order(&OrderKey::Reference(reference))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.amount.cents(), 2000);
    }

    #[tokio::test]
    async fn success_on_store_flow_does_not_double_debit() {
        let h = setup();
        let product = seed(&h, 10).await;

        let hold = h.holds.create_hold(product.id, 2).await.unwrap();
        let order = h.settlement.create_from_hold(hold.id).await.unwrap();

        let settlement = h
            .settlement
            .apply_payment_outcome(&OrderKey::Id(order.id), PaymentOutcome::Success)
            .await
            .unwrap();
        assert_eq!(settlement, Settlement::Applied(OrderStatus::Paid));

        // debited once at hold time, never again at settlement
        assert_eq!(h.store.product(product.id).await.unwrap().unwrap().stock, 8);
    }

    #[tokio::test]
    async fn failure_on_store_flow_credits_the_store() {
        let h = setup();
        let product = seed(&h, 10).await;

        let hold = h.holds.create_hold(product.id, 2).await.unwrap();
        let order = h.settlement.create_from_hold(hold.id).await.unwrap();

        h.settlement
            .apply_payment_outcome(&OrderKey::Id(order.id), PaymentOutcome::Failure)
            .await
            .unwrap();

        assert_eq!(h.store.product(product.id).await.unwrap().unwrap().stock, 10);
        assert_eq!(h.ledger.read(product.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn success_on_ledger_flow_settles_the_books() {
        let h = setup();
        let product = seed(&h, 10).await;
        h.ledger.initialize(product.id, 10).await.unwrap();
        // admission already happened at request time
        assert!(h.ledger.decrement_if_available(product.id, 2).await.unwrap());

        let order = h
            .settlement
            .create_from_reservation(product.id, 2, OrderReference::new("res-2"))
            .await
            .unwrap();

        h.settlement
            .apply_payment_outcome(&OrderKey::Reference(order.reference), PaymentOutcome::Success)
            .await
            .unwrap();

        // durable stock now matches what the ledger admitted
        assert_eq!(h.store.product(product.id).await.unwrap().unwrap().stock, 8);
        assert_eq!(h.ledger.read(product.id).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn failure_on_ledger_flow_credits_the_ledger() {
        let h = setup();
        let product = seed(&h, 10).await;
        h.ledger.initialize(product.id, 10).await.unwrap();
        assert!(h.ledger.decrement_if_available(product.id, 2).await.unwrap());

        let order = h
            .settlement
            .create_from_reservation(product.id, 2, OrderReference::new("res-3"))
            .await
            .unwrap();

        h.settlement
            .apply_payment_outcome(&OrderKey::Reference(order.reference), PaymentOutcome::Failure)
            .await
            .unwrap();

        // the store was never debited for this flow, so only the ledger moves
        assert_eq!(h.store.product(product.id).await.unwrap().unwrap().stock, 10);
        assert_eq!(h.ledger.read(product.id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn terminal_orders_absorb_repeat_outcomes() {
        let h = setup();
        let product = seed(&h, 10).await;

        let hold = h.holds.create_hold(product.id, 1).await.unwrap();
        let order = h.settlement.create_from_hold(hold.id).await.unwrap();
        let key = OrderKey::Id(order.id);

        h.settlement
            .apply_payment_outcome(&key, PaymentOutcome::Failure)
            .await
            .unwrap();
        let stock_after = h.store.product(product.id).await.unwrap().unwrap().stock;

        // a second failure must not credit the stock again
        let settlement = h
            .settlement
            .apply_payment_outcome(&key, PaymentOutcome::Failure)
            .await
            .unwrap();
        assert_eq!(settlement, Settlement::AlreadyTerminal(OrderStatus::Cancelled));
        assert_eq!(
            h.store.product(product.id).await.unwrap().unwrap().stock,
            stock_after
        );
    }

    #[tokio::test]
    async fn pending_webhook_applies_at_creation() {
        let h = setup();
        let product = seed(&h, 10).await;
        h.ledger.initialize(product.id, 10).await.unwrap();
        assert!(h.ledger.decrement_if_available(product.id, 1).await.unwrap());

        let reference = OrderReference::new("res-early");
        let key = IdempotencyKey::new("early-key");
        h.store
            .record_webhook(
                &key,
                WebhookPayload {
                    order: OrderKey::Reference(reference.clone()),
                    outcome: PaymentOutcome::Failure,
                },
                WebhookStatus::Pending,
                None,
            )
            .await
            .unwrap();

        let order = h
            .settlement
            .create_from_reservation(product.id, 1, reference)
            .await
            .unwrap();

        // the early failure was applied exactly once during creation
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(h.ledger.read(product.id).await.unwrap(), 10);
        let record = h.store.webhook(&key).await.unwrap().unwrap();
        assert_eq!(record.status, WebhookStatus::Processed);
        assert_eq!(record.applied, Some(OrderStatus::Cancelled));
    }

    #[tokio::test]
    async fn stale_pending_orders_are_reaped_per_flow() {
        let h = setup();
        let product = seed(&h, 10).await;
        h.ledger.initialize(product.id, 10).await.unwrap();
        assert!(h.ledger.decrement_if_available(product.id, 2).await.unwrap());

        // a ledger-flow order stuck pending for ten minutes
        let order = Order::from_reservation(
            product.id,
            2,
            OrderReference::new("res-stale"),
            product.price,
            Utc::now() - chrono::Duration::minutes(10),
        )
        .unwrap();
        h.store.insert_order(order).await.unwrap();

        let reaped = h
            .settlement
            .release_stale_orders(chrono::Duration::minutes(2))
            .await
            .unwrap();

        assert_eq!(reaped, 1);
        assert_eq!(h.ledger.read(product.id).await.unwrap(), 10);
        assert_eq!(h.store.product(product.id).await.unwrap().unwrap().stock, 10);
    }
}
