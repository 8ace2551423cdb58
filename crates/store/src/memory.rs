use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{HoldId, IdempotencyKey, OrderId, OrderReference, ProductId};
use domain::{
    Hold, Order, OrderKey, OrderStatus, Product, WebhookPayload, WebhookRecord, WebhookStatus,
};
use tokio::sync::RwLock;

use crate::{Result, StockStore, StoreError};

#[derive(Default)]
struct State {
    products: HashMap<ProductId, Product>,
    holds: HashMap<HoldId, Hold>,
    orders: HashMap<OrderId, Order>,
    reference_index: HashMap<OrderReference, OrderId>,
    webhooks: HashMap<IdempotencyKey, WebhookRecord>,
}

/// In-memory store implementation.
///
/// Backs the unit and integration tests and the default wiring; provides
/// the same per-operation atomicity as the PostgreSQL implementation via a
/// single writer lock.
#[derive(Clone, Default)]
pub struct InMemoryStockStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStockStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of holds currently persisted.
    pub async fn hold_count(&self) -> usize {
        self.state.read().await.holds.len()
    }

    /// Returns the number of webhook records currently persisted.
    pub async fn webhook_count(&self) -> usize {
        self.state.read().await.webhooks.len()
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn insert_product(&self, product: Product) -> Result<()> {
        let mut state = self.state.write().await;
        state.products.insert(product.id, product);
        Ok(())
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn products(&self) -> Result<Vec<Product>> {
        Ok(self.state.read().await.products.values().cloned().collect())
    }

    async fn debit_stock_if_available(&self, id: ProductId, qty: u32) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.products.get_mut(&id) {
            Some(product) if product.stock >= i64::from(qty) => {
                product.stock -= i64::from(qty);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn debit_stock(&self, id: ProductId, qty: u32) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(product) = state.products.get_mut(&id) {
            product.stock -= i64::from(qty);
        }
        Ok(())
    }

    async fn credit_stock(&self, id: ProductId, qty: u32) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(product) = state.products.get_mut(&id) {
            product.stock += i64::from(qty);
        }
        Ok(())
    }

    async fn pending_order_qty(&self, id: ProductId) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|o| o.product_id == id && o.status == OrderStatus::Pending)
            .map(|o| i64::from(o.qty))
            .sum())
    }

    async fn insert_hold(&self, hold: Hold) -> Result<()> {
        let mut state = self.state.write().await;
        state.holds.insert(hold.id, hold);
        Ok(())
    }

    async fn hold(&self, id: HoldId) -> Result<Option<Hold>> {
        Ok(self.state.read().await.holds.get(&id).cloned())
    }

    async fn remove_hold(&self, id: HoldId) -> Result<Option<Hold>> {
        Ok(self.state.write().await.holds.remove(&id))
    }

    async fn expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Hold>> {
        let state = self.state.read().await;
        Ok(state
            .holds
            .values()
            .filter(|h| h.is_expired(now))
            .cloned()
            .collect())
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        let mut state = self.state.write().await;
        if state.reference_index.contains_key(&order.reference) {
            return Err(StoreError::DuplicateReference(order.reference));
        }
        state.reference_index.insert(order.reference.clone(), order.id);
        state.orders.insert(order.id, order);
        Ok(())
    }

    async fn order(&self, key: &OrderKey) -> Result<Option<Order>> {
        let state = self.state.read().await;
        let id = match key {
            OrderKey::Id(id) => Some(*id),
            OrderKey::Reference(reference) => state.reference_index.get(reference).copied(),
        };
        Ok(id.and_then(|id| state.orders.get(&id).cloned()))
    }

    async fn set_order_status(&self, id: OrderId, status: OrderStatus) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(order) = state.orders.get_mut(&id) {
            order.status = status;
        }
        Ok(())
    }

    async fn pending_orders_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn webhook(&self, key: &IdempotencyKey) -> Result<Option<WebhookRecord>> {
        Ok(self.state.read().await.webhooks.get(key).cloned())
    }

    async fn record_webhook(
        &self,
        key: &IdempotencyKey,
        payload: WebhookPayload,
        status: WebhookStatus,
        applied: Option<OrderStatus>,
    ) -> Result<WebhookRecord> {
        let mut state = self.state.write().await;
        let record = match state.webhooks.get_mut(key) {
            Some(existing) => {
                existing.payload = payload;
                existing.status = status;
                existing.applied = applied;
                existing.attempts += 1;
                existing.clone()
            }
            None => {
                let record = WebhookRecord {
                    idempotency_key: key.clone(),
                    payload,
                    status,
                    attempts: 1,
                    applied,
                    received_at: Utc::now(),
                };
                state.webhooks.insert(key.clone(), record.clone());
                record
            }
        };
        Ok(record)
    }

    async fn mark_webhook_processed(
        &self,
        key: &IdempotencyKey,
        applied: OrderStatus,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(record) = state.webhooks.get_mut(key) {
            record.status = WebhookStatus::Processed;
            record.applied = Some(applied);
        }
        Ok(())
    }

    async fn pending_webhook_for(&self, order: &Order) -> Result<Option<WebhookRecord>> {
        let state = self.state.read().await;
        Ok(state
            .webhooks
            .values()
            .find(|w| w.status == WebhookStatus::Pending && w.payload.order.matches(order))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;
    use domain::PaymentOutcome;

    fn product(stock: i64) -> Product {
        Product::new("Test Item", Money::from_cents(1000), stock)
    }

    #[tokio::test]
    async fn conditional_debit_stops_at_zero() {
        let store = InMemoryStockStore::new();
        let p = product(3);
        let id = p.id;
        store.insert_product(p).await.unwrap();

        assert!(store.debit_stock_if_available(id, 2).await.unwrap());
        assert!(store.debit_stock_if_available(id, 1).await.unwrap());
        assert!(!store.debit_stock_if_available(id, 1).await.unwrap());

        let product = store.product(id).await.unwrap().unwrap();
        assert_eq!(product.stock, 0);
    }

    #[tokio::test]
    async fn conditional_debit_on_missing_product_fails() {
        let store = InMemoryStockStore::new();
        assert!(
            !store
                .debit_stock_if_available(ProductId::new(), 1)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn credit_and_debit_adjust_stock() {
        let store = InMemoryStockStore::new();
        let p = product(10);
        let id = p.id;
        store.insert_product(p).await.unwrap();

        store.debit_stock(id, 4).await.unwrap();
        store.credit_stock(id, 1).await.unwrap();

        assert_eq!(store.product(id).await.unwrap().unwrap().stock, 7);
    }

    #[tokio::test]
    async fn remove_hold_returns_none_the_second_time() {
        let store = InMemoryStockStore::new();
        let hold = Hold::new(ProductId::new(), 2, chrono::Duration::minutes(2), Utc::now()).unwrap();
        let id = hold.id;
        store.insert_hold(hold.clone()).await.unwrap();

        assert_eq!(store.remove_hold(id).await.unwrap(), Some(hold));
        assert_eq!(store.remove_hold(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_holds_filters_by_deadline() {
        let store = InMemoryStockStore::new();
        let now = Utc::now();
        let live = Hold::new(ProductId::new(), 1, chrono::Duration::minutes(2), now).unwrap();
        let expired =
            Hold::new(ProductId::new(), 1, chrono::Duration::minutes(-5), now).unwrap();
        store.insert_hold(live).await.unwrap();
        store.insert_hold(expired.clone()).await.unwrap();

        let result = store.expired_holds(now).await.unwrap();
        assert_eq!(result, vec![expired]);
    }

    #[tokio::test]
    async fn duplicate_order_reference_is_rejected() {
        let store = InMemoryStockStore::new();
        let p = product(10);
        store.insert_product(p.clone()).await.unwrap();

        let reference = OrderReference::new("ref-dup");
        let first = Order::from_reservation(
            p.id,
            1,
            reference.clone(),
            Money::from_cents(1000),
            Utc::now(),
        )
        .unwrap();
        let second = Order::from_reservation(
            p.id,
            1,
            reference.clone(),
            Money::from_cents(1000),
            Utc::now(),
        )
        .unwrap();

        store.insert_order(first.clone()).await.unwrap();
        let err = store.insert_order(second).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateReference(r) if r == reference));

        // the original row is untouched and addressable both ways
        let by_ref = store
            .order(&OrderKey::Reference(reference))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_ref.id, first.id);
        let by_id = store.order(&OrderKey::Id(first.id)).await.unwrap().unwrap();
        assert_eq!(by_id.reference, first.reference);
    }

    #[tokio::test]
    async fn record_webhook_counts_attempts() {
        let store = InMemoryStockStore::new();
        let key = IdempotencyKey::new("key-1");
        let payload = WebhookPayload {
            order: OrderKey::Reference(OrderReference::new("ref-1")),
            outcome: PaymentOutcome::Success,
        };

        let first = store
            .record_webhook(&key, payload.clone(), WebhookStatus::Pending, None)
            .await
            .unwrap();
        assert_eq!(first.attempts, 1);

        let second = store
            .record_webhook(
                &key,
                payload,
                WebhookStatus::Processed,
                Some(OrderStatus::Paid),
            )
            .await
            .unwrap();
        assert_eq!(second.attempts, 2);
        assert_eq!(second.status, WebhookStatus::Processed);
        assert_eq!(second.received_at, first.received_at);
        assert_eq!(store.webhook_count().await, 1);
    }

    #[tokio::test]
    async fn pending_webhook_matches_by_reference_or_id() {
        let store = InMemoryStockStore::new();
        let p = product(10);
        store.insert_product(p.clone()).await.unwrap();
        let order = Order::from_reservation(
            p.id,
            1,
            OrderReference::new("ref-match"),
            Money::from_cents(1000),
            Utc::now(),
        )
        .unwrap();
        store.insert_order(order.clone()).await.unwrap();

        store
            .record_webhook(
                &IdempotencyKey::new("by-ref"),
                WebhookPayload {
                    order: OrderKey::Reference(order.reference.clone()),
                    outcome: PaymentOutcome::Success,
                },
                WebhookStatus::Pending,
                None,
            )
            .await
            .unwrap();

        let found = store.pending_webhook_for(&order).await.unwrap().unwrap();
        assert_eq!(found.idempotency_key, IdempotencyKey::new("by-ref"));

        store
            .mark_webhook_processed(&found.idempotency_key, OrderStatus::Paid)
            .await
            .unwrap();
        assert!(store.pending_webhook_for(&order).await.unwrap().is_none());

        let record = store
            .webhook(&IdempotencyKey::new("by-ref"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, WebhookStatus::Processed);
        assert_eq!(record.applied, Some(OrderStatus::Paid));
        // rendezvous processing is not a delivery attempt
        assert_eq!(record.attempts, 1);
    }

    #[tokio::test]
    async fn pending_order_accounting() {
        let store = InMemoryStockStore::new();
        let p = product(10);
        store.insert_product(p.clone()).await.unwrap();

        let pending = Order::from_reservation(
            p.id,
            3,
            OrderReference::new("ref-p"),
            Money::from_cents(1000),
            Utc::now(),
        )
        .unwrap();
        let mut paid = Order::from_reservation(
            p.id,
            2,
            OrderReference::new("ref-q"),
            Money::from_cents(1000),
            Utc::now(),
        )
        .unwrap();
        paid.transition(OrderStatus::Paid).unwrap();

        store.insert_order(pending).await.unwrap();
        store.insert_order(paid).await.unwrap();

        assert_eq!(store.pending_order_qty(p.id).await.unwrap(), 3);
    }
}
