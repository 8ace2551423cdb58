//! Redis ledger integration tests
//!
//! These tests use a shared Redis container. Run with:
//!
//! ```bash
//! cargo test -p ledger --test redis_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::ProductId;
use ledger::{RedisStockLedger, StockLedger};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Redis>,
    url: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_ledger() -> RedisStockLedger {
    let info = CONTAINER
        .get_or_init(|| async {
            let container = Redis::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(6379).await.unwrap();
            Arc::new(ContainerInfo {
                container,
                url: format!("redis://{}:{}", host, port),
            })
        })
        .await
        .clone();

    RedisStockLedger::connect(&info.url).await.unwrap()
}

#[tokio::test]
async fn initialize_and_read() {
    let ledger = get_ledger().await;
    let id = ProductId::new();

    ledger.initialize(id, 100).await.unwrap();
    assert_eq!(ledger.read(id).await.unwrap(), 100);
    assert!(ledger.contains(id).await.unwrap());
}

#[tokio::test]
async fn missing_counter_reads_zero() {
    let ledger = get_ledger().await;
    let id = ProductId::new();

    assert_eq!(ledger.read(id).await.unwrap(), 0);
    assert!(!ledger.contains(id).await.unwrap());
    assert!(!ledger.decrement_if_available(id, 1).await.unwrap());
}

#[tokio::test]
async fn scripted_decrement_is_guarded() {
    let ledger = get_ledger().await;
    let id = ProductId::new();
    ledger.initialize(id, 3).await.unwrap();

    assert!(ledger.decrement_if_available(id, 2).await.unwrap());
    assert!(!ledger.decrement_if_available(id, 2).await.unwrap());
    assert!(ledger.decrement_if_available(id, 1).await.unwrap());
    assert_eq!(ledger.read(id).await.unwrap(), 0);
}

#[tokio::test]
async fn increment_creates_missing_counter() {
    let ledger = get_ledger().await;
    let id = ProductId::new();

    ledger.increment(id, 5).await.unwrap();
    assert_eq!(ledger.read(id).await.unwrap(), 5);
}

#[tokio::test]
async fn concurrent_decrements_never_oversell() {
    let ledger = get_ledger().await;
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
