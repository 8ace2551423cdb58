//! Webhook reconciliation: apply payment outcomes exactly once.

use std::time::{Duration, Instant};

use common::IdempotencyKey;
use domain::{OrderKey, OrderStatus, WebhookPayload, WebhookStatus};
use ledger::StockLedger;
use locks::LockCoordinator;
use store::StockStore;

use crate::error::EngineError;
use crate::orders::OrderSettlement;

/// Lock waits beyond this are logged as contention.
const CONTENTION_WARN_THRESHOLD: Duration = Duration::from_millis(100);

/// What handling a webhook delivery did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// The outcome was applied; the order now has this status.
    Applied(OrderStatus),
    /// This idempotency key was already processed; the recorded outcome is
    /// returned verbatim and no side effects ran.
    AlreadyProcessed { order_status: Option<OrderStatus> },
    /// The order was already terminal; the delivery was recorded as a
    /// duplicate with no mutation.
    AlreadyTerminal(OrderStatus),
    /// The order does not exist yet; the delivery was recorded and will be
    /// applied when the order appears.
    Deferred,
}

/// Applies external payment-outcome events to orders exactly once.
///
/// Deliveries are at-least-once and may race order creation or each other.
/// The per-key lock serializes duplicate deliveries; the per-order lock
/// serializes against order creation, whose rendezvous picks up deliveries
/// recorded before the order existed.
#[derive(Clone)]
pub struct WebhookReconciler<S, G, L: LockCoordinator> {
    store: S,
    settlement: OrderSettlement<S, G, L>,
    locks: L,
    lock_wait: Duration,
}

impl<S, G, L> WebhookReconciler<S, G, L>
where
    S: StockStore + Clone,
    G: StockLedger + Clone,
    L: LockCoordinator + Clone,
{
    /// Creates a reconciler.
    pub fn new(
        store: S,
        settlement: OrderSettlement<S, G, L>,
        locks: L,
        lock_wait: Duration,
    ) -> Self {
        Self {
            store,
            settlement,
            locks,
            lock_wait,
        }
    }

    /// Handles one delivery of a payment notification.
    #[tracing::instrument(skip(self, payload), fields(order = %payload.order, outcome = %payload.outcome))]
    pub async fn handle(
        &self,
        key: &IdempotencyKey,
        payload: WebhookPayload,
    ) -> Result<WebhookDisposition, EngineError> {
        let wait_started = Instant::now();
        let _key_lock = self
            .locks
            .acquire(&format!("webhook:{key}"), self.lock_wait, self.lock_wait)
            .await?;

        let waited = wait_started.elapsed();
        metrics::histogram!("webhook_lock_wait_seconds").record(waited.as_secs_f64());
        if waited > CONTENTION_WARN_THRESHOLD {
            tracing::warn!(
                idempotency_key = %key,
                lock_wait_ms = waited.as_millis() as u64,
                "webhook lock contention detected"
            );
        }

        // full idempotence: a processed key replays its recorded outcome
        if let Some(existing) = self.store.webhook(key).await?
            && existing.status == WebhookStatus::Processed
        {
            metrics::counter!("webhooks_duplicate_total").increment(1);
            tracing::info!(idempotency_key = %key, "webhook already processed");
            return Ok(WebhookDisposition::AlreadyProcessed {
                order_status: existing.applied,
            });
        }

        if self.store.order(&payload.order).await?.is_none() {
            // Possibly arrived before the order was created. Serialize with
            // order creation on the addressed handle (creation holds both of
            // its handles while inserting and running the rendezvous), then
            // re-check.
            let _handle_lock = self
                .locks
                .acquire(
                    &format!("order:{}", payload.order),
                    self.lock_wait,
                    self.lock_wait,
                )
                .await?;

            if self.store.order(&payload.order).await?.is_none() {
                // the creation path's rendezvous applies the recorded
                // outcome once the order appears
                self.store
                    .record_webhook(key, payload.clone(), WebhookStatus::Pending, None)
                    .await?;
                metrics::counter!("webhooks_deferred_total").increment(1);
                tracing::warn!(
                    idempotency_key = %key,
                    order = %payload.order,
                    "webhook arrived before order creation, recorded for later processing"
                );
                return Ok(WebhookDisposition::Deferred);
            }
            // created while we waited; fall through and apply normally
        }

        self.apply_to_existing(key, payload).await
    }

    /// Applies a delivery to an order known to exist, under the order's
    /// canonical reference lock.
    async fn apply_to_existing(
        &self,
        key: &IdempotencyKey,
        payload: WebhookPayload,
    ) -> Result<WebhookDisposition, EngineError> {
        let hint = self
            .store
            .order(&payload.order)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(payload.order.to_string()))?;

        let _order_lock = self
            .locks
            .acquire(
                &format!("order:{}", hint.reference),
                self.lock_wait,
                self.lock_wait,
            )
            .await?;

        // fresh read under the lock; the hint may have settled meanwhile
        let order = self
            .store
            .order(&OrderKey::Id(hint.id))
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(payload.order.to_string()))?;

        if order.status.is_terminal() {
            self.store
                .record_webhook(key, payload, WebhookStatus::Processed, Some(order.status))
                .await?;
            metrics::counter!("webhooks_duplicate_total").increment(1);
            tracing::info!(
                idempotency_key = %key,
                order_status = %order.status,
                "order already in final state"
            );
            return Ok(WebhookDisposition::AlreadyTerminal(order.status));
        }

        let settlement = self
            .settlement
            .apply_outcome_locked(&order, payload.outcome)
            .await?;
        self.store
            .record_webhook(
                key,
                payload,
                WebhookStatus::Processed,
                Some(settlement.status()),
            )
            .await?;

        metrics::counter!("webhooks_applied_total").increment(1);
        Ok(WebhookDisposition::Applied(settlement.status()))
    }
}
