//! Product reads and ledger priming.

use common::{Money, ProductId};
use ledger::StockLedger;
use store::StockStore;

use crate::error::EngineError;

/// A product as served to clients, with the best-available stock figure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductView {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: i64,
}

/// Serves product attributes with the freshest stock figure on hand.
///
/// Stock comes from the ledger when its counter exists. When the counter is
/// gone (flushed, never primed) the figure is reconstructed from the store
/// minus in-flight pending orders, and the ledger is re-primed with it —
/// the one place a ledger miss falls back instead of failing.
#[derive(Clone)]
pub struct ProductReader<S, G> {
    store: S,
    ledger: G,
}

impl<S, G> ProductReader<S, G>
where
    S: StockStore + Clone,
    G: StockLedger + Clone,
{
    /// Creates a product reader.
    pub fn new(store: S, ledger: G) -> Self {
        Self { store, ledger }
    }

    /// Loads a product with its best-available stock figure.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: ProductId) -> Result<ProductView, EngineError> {
        let product = self
            .store
            .product(id)
            .await?
            .ok_or(EngineError::ProductNotFound(id))?;

        let stock = if self.ledger.contains(id).await? {
            self.ledger.read(id).await?
        } else {
            let pending = self.store.pending_order_qty(id).await?;
            let available = product.stock - pending;
            self.ledger.initialize(id, available).await?;
            tracing::info!(
                product_id = %id,
                stock = available,
                pending_qty = pending,
                "ledger counter rebuilt from the store"
            );
            available
        };

        Ok(ProductView {
            id: product.id,
            name: product.name,
            price: product.price,
            stock,
        })
    }

    /// Primes ledger counters for every product from the store.
    ///
    /// Overwrites in-flight reservation effects; run only when no
    /// concurrent buying is occurring.
    #[tracing::instrument(skip(self))]
    pub async fn sync_to_ledger(&self) -> Result<usize, EngineError> {
        let products = self.store.products().await?;
        let count = products.len();
        for product in products {
            self.ledger.initialize(product.id, product.stock).await?;
            tracing::info!(product_id = %product.id, stock = product.stock, "synced product to ledger");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::OrderReference;
    use domain::{Order, Product};
    use ledger::InMemoryStockLedger;
    use store::InMemoryStockStore;

    fn reader(
        store: InMemoryStockStore,
        ledger: InMemoryStockLedger,
    ) -> ProductReader<InMemoryStockStore, InMemoryStockLedger> {
        ProductReader::new(store, ledger)
    }

    #[tokio::test]
    async fn ledger_backed_stock_wins() {
        let store = InMemoryStockStore::new();
        let ledger = InMemoryStockLedger::new();
        let product = Product::new("Item", Money::from_cents(100), 50);
        store.insert_product(product.clone()).await.unwrap();
        ledger.initialize(product.id, 42).await.unwrap();

        let view = reader(store, ledger).get(product.id).await.unwrap();
        assert_eq!(view.stock, 42);
        assert_eq!(view.price, Money::from_cents(100));
    }

    #[tokio::test]
    async fn cold_ledger_falls_back_with_pending_adjustment_and_reprimes() {
        let store = InMemoryStockStore::new();
        let ledger = InMemoryStockLedger::new();
        let product = Product::new("Item", Money::from_cents(100), 50);
        store.insert_product(product.clone()).await.unwrap();

        // three units are tied up in a pending reservation order
        let order = Order::from_reservation(
            product.id,
            3,
            OrderReference::new("pending-1"),
            product.price,
            Utc::now(),
        )
        .unwrap();
        store.insert_order(order).await.unwrap();

        let view = reader(store, ledger.clone()).get(product.id).await.unwrap();
        assert_eq!(view.stock, 47);

        // the counter was rebuilt so the next read is ledger-backed
        assert!(ledger.contains(product.id).await.unwrap());
        assert_eq!(ledger.read(product.id).await.unwrap(), 47);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let store = InMemoryStockStore::new();
        let ledger = InMemoryStockLedger::new();

        let err = reader(store, ledger).get(ProductId::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn sync_primes_every_counter() {
        let store = InMemoryStockStore::new();
        let ledger = InMemoryStockLedger::new();
        let a = Product::new("A", Money::from_cents(100), 10);
        let b = Product::new("B", Money::from_cents(200), 20);
        store.insert_product(a.clone()).await.unwrap();
        store.insert_product(b.clone()).await.unwrap();

        let synced = reader(store, ledger.clone()).sync_to_ledger().await.unwrap();
        assert_eq!(synced, 2);
        assert_eq!(ledger.read(a.id).await.unwrap(), 10);
        assert_eq!(ledger.read(b.id).await.unwrap(), 20);
    }
}
