use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{HoldId, IdempotencyKey, OrderId, ProductId};
use domain::{
    Hold, Order, OrderKey, OrderStatus, Product, WebhookPayload, WebhookRecord, WebhookStatus,
};

use crate::Result;

/// The authoritative store for products, holds, orders, and webhook records.
///
/// Implementations must make each method individually atomic. The
/// read-modify-write sections spanning several calls are serialized by the
/// callers' locks, not here.
#[async_trait]
pub trait StockStore: Send + Sync {
    // -- products --

    /// Inserts a product row.
    async fn insert_product(&self, product: Product) -> Result<()>;

    /// Loads a product by id.
    async fn product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Lists all products (ledger priming, seeding).
    async fn products(&self) -> Result<Vec<Product>>;

    /// Atomically debits `qty` units if at least that many remain.
    ///
    /// Returns `true` when the debit happened, `false` when stock was
    /// insufficient (no mutation). A missing product counts as insufficient.
    /// This is the admission primitive for the hold flow: two concurrent
    /// callers competing for the last unit cannot both succeed.
    async fn debit_stock_if_available(&self, id: ProductId, qty: u32) -> Result<bool>;

    /// Unconditionally debits `qty` units (paid-side accounting for
    /// ledger-admitted orders).
    async fn debit_stock(&self, id: ProductId, qty: u32) -> Result<()>;

    /// Credits `qty` units back (hold expiry, cancellation, failed payment).
    async fn credit_stock(&self, id: ProductId, qty: u32) -> Result<()>;

    /// Total quantity tied up in pending orders for a product.
    async fn pending_order_qty(&self, id: ProductId) -> Result<i64>;

    // -- holds --

    /// Persists a hold.
    async fn insert_hold(&self, hold: Hold) -> Result<()>;

    /// Loads a hold by id.
    async fn hold(&self, id: HoldId) -> Result<Option<Hold>>;

    /// Removes a hold, returning it if it still existed.
    ///
    /// The `None` case is the benign conversion/expiry race: whoever holds
    /// the per-hold lock second observes the hold already gone.
    async fn remove_hold(&self, id: HoldId) -> Result<Option<Hold>>;

    /// Holds whose deadline has passed as of `now`.
    async fn expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Hold>>;

    // -- orders --

    /// Inserts an order row.
    ///
    /// Fails with [`StoreError::DuplicateReference`] when an order with the
    /// same reference already exists.
    ///
    /// [`StoreError::DuplicateReference`]: crate::StoreError::DuplicateReference
    async fn insert_order(&self, order: Order) -> Result<()>;

    /// Loads an order by either of its handles.
    async fn order(&self, key: &OrderKey) -> Result<Option<Order>>;

    /// Sets an order's status. Missing orders are a no-op.
    async fn set_order_status(&self, id: OrderId, status: OrderStatus) -> Result<()>;

    /// Pending orders created before `cutoff` (stale-order reaping).
    async fn pending_orders_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>>;

    // -- webhooks --

    /// Loads a webhook record by idempotency key.
    async fn webhook(&self, key: &IdempotencyKey) -> Result<Option<WebhookRecord>>;

    /// Upserts a webhook record for a delivery, bumping its attempt count.
    ///
    /// A new key starts at one attempt; an existing record keeps its
    /// original `received_at` and gains an attempt.
    async fn record_webhook(
        &self,
        key: &IdempotencyKey,
        payload: WebhookPayload,
        status: WebhookStatus,
        applied: Option<OrderStatus>,
    ) -> Result<WebhookRecord>;

    /// Marks an existing record processed without counting a delivery
    /// attempt (the order-creation rendezvous path).
    async fn mark_webhook_processed(
        &self,
        key: &IdempotencyKey,
        applied: OrderStatus,
    ) -> Result<()>;

    /// The pending webhook record addressing this order, if one arrived
    /// before the order existed.
    async fn pending_webhook_for(&self, order: &Order) -> Result<Option<WebhookRecord>>;
}
