use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{HoldId, IdempotencyKey, Money, OrderId, OrderReference, ProductId};
use domain::{
    Hold, Order, OrderKey, OrderStatus, PaymentOutcome, Product, StockDebit, WebhookPayload,
    WebhookRecord, WebhookStatus,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{Result, StockStore, StoreError};

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: row.try_get("stock")?,
        })
    }

    fn row_to_hold(row: PgRow) -> Result<Hold> {
        Ok(Hold {
            id: HoldId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            qty: row.try_get::<i32, _>("qty")? as u32,
            expire_at: row.try_get("expire_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let debit: String = row.try_get("debit")?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            reference: OrderReference::new(row.try_get::<String, _>("order_reference")?),
            hold_id: row
                .try_get::<Option<Uuid>, _>("hold_id")?
                .map(HoldId::from_uuid),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            qty: row.try_get::<i32, _>("qty")? as u32,
            amount: Money::from_cents(row.try_get("amount_cents")?),
            status: OrderStatus::parse(&status)
                .ok_or_else(|| StoreError::InvalidRow(format!("order status '{status}'")))?,
            debit: StockDebit::parse(&debit)
                .ok_or_else(|| StoreError::InvalidRow(format!("order debit '{debit}'")))?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_webhook(row: PgRow) -> Result<WebhookRecord> {
        let order = match row.try_get::<Option<String>, _>("order_reference")? {
            Some(reference) => OrderKey::Reference(OrderReference::new(reference)),
            None => {
                let id = row.try_get::<Option<Uuid>, _>("order_id")?.ok_or_else(|| {
                    StoreError::InvalidRow("webhook row addresses no order".to_string())
                })?;
                OrderKey::Id(OrderId::from_uuid(id))
            }
        };

        let outcome: String = row.try_get("outcome")?;
        let status: String = row.try_get("status")?;
        let applied: Option<String> = row.try_get("applied_status")?;

        Ok(WebhookRecord {
            idempotency_key: IdempotencyKey::new(row.try_get::<String, _>("idempotency_key")?),
            payload: WebhookPayload {
                order,
                outcome: PaymentOutcome::parse(&outcome).ok_or_else(|| {
                    StoreError::InvalidRow(format!("webhook outcome '{outcome}'"))
                })?,
            },
            status: WebhookStatus::parse(&status)
                .ok_or_else(|| StoreError::InvalidRow(format!("webhook status '{status}'")))?,
            attempts: row.try_get::<i32, _>("attempts")? as u32,
            applied: applied
                .map(|s| {
                    OrderStatus::parse(&s)
                        .ok_or_else(|| StoreError::InvalidRow(format!("applied status '{s}'")))
                })
                .transpose()?,
            received_at: row.try_get("received_at")?,
        })
    }

    fn order_key_columns(key: &OrderKey) -> (Option<&str>, Option<Uuid>) {
        match key {
            OrderKey::Reference(reference) => (Some(reference.as_str()), None),
            OrderKey::Id(id) => (None, Some(id.as_uuid())),
        }
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    async fn insert_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (id, name, price_cents, stock) VALUES ($1, $2, $3, $4)",
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.stock)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT id, name, price_cents, stock FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_product).transpose()
    }

    async fn products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query("SELECT id, name, price_cents, stock FROM products ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn debit_stock_if_available(&self, id: ProductId, qty: u32) -> Result<bool> {
        let result =
            sqlx::query("UPDATE products SET stock = stock - $2 WHERE id = $1 AND stock >= $2")
                .bind(id.as_uuid())
                .bind(i64::from(qty))
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn debit_stock(&self, id: ProductId, qty: u32) -> Result<()> {
        sqlx::query("UPDATE products SET stock = stock - $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(i64::from(qty))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn credit_stock(&self, id: ProductId, qty: u32) -> Result<()> {
        sqlx::query("UPDATE products SET stock = stock + $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(i64::from(qty))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pending_order_qty(&self, id: ProductId) -> Result<i64> {
        let qty: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(qty), 0) FROM orders WHERE product_id = $1 AND status = 'pending'",
        )
        .bind(id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(qty)
    }

    async fn insert_hold(&self, hold: Hold) -> Result<()> {
        sqlx::query(
            "INSERT INTO holds (id, product_id, qty, expire_at, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(hold.id.as_uuid())
        .bind(hold.product_id.as_uuid())
        .bind(hold.qty as i32)
        .bind(hold.expire_at)
        .bind(hold.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn hold(&self, id: HoldId) -> Result<Option<Hold>> {
        let row = sqlx::query(
            "SELECT id, product_id, qty, expire_at, created_at FROM holds WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_hold).transpose()
    }

    async fn remove_hold(&self, id: HoldId) -> Result<Option<Hold>> {
        let row = sqlx::query(
            "DELETE FROM holds WHERE id = $1 \
             RETURNING id, product_id, qty, expire_at, created_at",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_hold).transpose()
    }

    async fn expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Hold>> {
        let rows = sqlx::query(
            "SELECT id, product_id, qty, expire_at, created_at FROM holds WHERE expire_at <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_hold).collect()
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders \
             (id, order_reference, hold_id, product_id, qty, amount_cents, status, debit, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(order.id.as_uuid())
        .bind(order.reference.as_str())
        .bind(order.hold_id.map(|h| h.as_uuid()))
        .bind(order.product_id.as_uuid())
        .bind(order.qty as i32)
        .bind(order.amount.cents())
        .bind(order.status.as_str())
        .bind(order.debit.as_str())
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_order_reference")
            {
                return StoreError::DuplicateReference(order.reference.clone());
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }

    async fn order(&self, key: &OrderKey) -> Result<Option<Order>> {
        let (reference, id) = Self::order_key_columns(key);
        let row = sqlx::query(
            "SELECT id, order_reference, hold_id, product_id, qty, amount_cents, status, debit, created_at \
             FROM orders WHERE ($1::TEXT IS NOT NULL AND order_reference = $1) \
                OR ($2::UUID IS NOT NULL AND id = $2)",
        )
        .bind(reference)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn set_order_status(&self, id: OrderId, status: OrderStatus) -> Result<()> {
        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pending_orders_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT id, order_reference, hold_id, product_id, qty, amount_cents, status, debit, created_at \
             FROM orders WHERE status = 'pending' AND created_at < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn webhook(&self, key: &IdempotencyKey) -> Result<Option<WebhookRecord>> {
        let row = sqlx::query(
            "SELECT idempotency_key, order_reference, order_id, outcome, status, attempts, applied_status, received_at \
             FROM webhooks WHERE idempotency_key = $1",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_webhook).transpose()
    }

    async fn record_webhook(
        &self,
        key: &IdempotencyKey,
        payload: WebhookPayload,
        status: WebhookStatus,
        applied: Option<OrderStatus>,
    ) -> Result<WebhookRecord> {
        let (reference, order_id) = Self::order_key_columns(&payload.order);
        let row = sqlx::query(
            "INSERT INTO webhooks \
             (idempotency_key, order_reference, order_id, outcome, status, attempts, applied_status, received_at) \
             VALUES ($1, $2, $3, $4, $5, 1, $6, $7) \
             ON CONFLICT (idempotency_key) DO UPDATE SET \
                order_reference = EXCLUDED.order_reference, \
                order_id = EXCLUDED.order_id, \
                outcome = EXCLUDED.outcome, \
                status = EXCLUDED.status, \
                applied_status = EXCLUDED.applied_status, \
                attempts = webhooks.attempts + 1 \
             RETURNING idempotency_key, order_reference, order_id, outcome, status, attempts, applied_status, received_at",
        )
        .bind(key.as_str())
        .bind(reference)
        .bind(order_id)
        .bind(payload.outcome.to_string())
        .bind(status.as_str())
        .bind(applied.map(|s| s.as_str()))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_webhook(row)
    }

    async fn mark_webhook_processed(
        &self,
        key: &IdempotencyKey,
        applied: OrderStatus,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE webhooks SET status = 'processed', applied_status = $2 \
             WHERE idempotency_key = $1",
        )
        .bind(key.as_str())
        .bind(applied.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_webhook_for(&self, order: &Order) -> Result<Option<WebhookRecord>> {
        let row = sqlx::query(
            "SELECT idempotency_key, order_reference, order_id, outcome, status, attempts, applied_status, received_at \
             FROM webhooks WHERE status = 'pending' \
               AND (order_reference = $1 OR order_id = $2) \
             ORDER BY received_at ASC LIMIT 1",
        )
        .bind(order.reference.as_str())
        .bind(order.id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_webhook).transpose()
    }
}
