use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::ProductId;

use crate::{Result, StockLedger};

/// In-memory ledger implementation.
///
/// The mutex provides the same check-and-decrement atomicity the Redis
/// implementation gets from its server-side script.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockLedger {
    counters: Arc<Mutex<HashMap<ProductId, i64>>>,
}

impl InMemoryStockLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn initialize(&self, product_id: ProductId, qty: i64) -> Result<()> {
        self.counters.lock().unwrap().insert(product_id, qty);
        Ok(())
    }

    async fn decrement_if_available(&self, product_id: ProductId, qty: u32) -> Result<bool> {
        let mut counters = self.counters.lock().unwrap();
        let current = counters.entry(product_id).or_insert(0);
        if *current >= i64::from(qty) {
            *current -= i64::from(qty);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn increment(&self, product_id: ProductId, qty: u32) -> Result<()> {
        let mut counters = self.counters.lock().unwrap();
        *counters.entry(product_id).or_insert(0) += i64::from(qty);
        Ok(())
    }

    async fn read(&self, product_id: ProductId) -> Result<i64> {
        Ok(self
            .counters
            .lock()
            .unwrap()
            .get(&product_id)
            .copied()
            .unwrap_or(0))
    }

    async fn contains(&self, product_id: ProductId) -> Result<bool> {
        Ok(self.counters.lock().unwrap().contains_key(&product_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decrement_respects_availability() {
        let ledger = InMemoryStockLedger::new();
        let id = ProductId::new();
        ledger.initialize(id, 3).await.unwrap();

        assert!(ledger.decrement_if_available(id, 2).await.unwrap());
        assert!(!ledger.decrement_if_available(id, 2).await.unwrap());
        assert!(ledger.decrement_if_available(id, 1).await.unwrap());
        assert_eq!(ledger.read(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_counter_reads_zero_and_rejects() {
        let ledger = InMemoryStockLedger::new();
        let id = ProductId::new();

        assert_eq!(ledger.read(id).await.unwrap(), 0);
        assert!(!ledger.contains(id).await.unwrap());
        assert!(!ledger.decrement_if_available(id, 1).await.unwrap());
    }

    #[tokio::test]
    async fn increment_creates_missing_counter() {
        let ledger = InMemoryStockLedger::new();
        let id = ProductId::new();

        ledger.increment(id, 4).await.unwrap();
        assert_eq!(ledger.read(id).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn initialize_overwrites() {
        let ledger = InMemoryStockLedger::new();
        let id = ProductId::new();
        ledger.initialize(id, 10).await.unwrap();
        ledger.decrement_if_available(id, 3).await.unwrap();

        ledger.initialize(id, 10).await.unwrap();
        assert_eq!(ledger.read(id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn concurrent_decrements_never_oversell() {
        let ledger = InMemoryStockLedger::new();
        let id = ProductId::new();
        ledger.initialize(id, 5).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.decrement_if_available(id, 1).await.unwrap()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 5);
        assert_eq!(ledger.read(id).await.unwrap(), 0);
    }
}
