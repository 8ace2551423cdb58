//! Redis lock integration tests
//!
//! These tests use a shared Redis container. Run with:
//!
//! ```bash
//! cargo test -p locks --test redis_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use locks::{LockCoordinator, LockError, RedisLockCoordinator};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;
use uuid::Uuid;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Redis>,
    url: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_coordinator() -> RedisLockCoordinator {
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

    RedisLockCoordinator::connect(&info.url).await.unwrap()
}

const TTL: Duration = Duration::from_secs(5);

fn unique_name(prefix: &str) -> String {
    format!("{prefix}:{}", Uuid::new_v4())
}

#[tokio::test]
async fn acquire_excludes_and_drop_releases() {
    let locks = get_coordinator().await;
    let name = unique_name("excl");

    let guard = locks
        .acquire(&name, TTL, Duration::from_millis(100))
        .await
        .unwrap();
    assert!(locks.try_acquire(&name, TTL).await.unwrap().is_none());

    drop(guard);
    // release is scheduled on the runtime; give it a moment
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(locks.try_acquire(&name, TTL).await.unwrap().is_some());
}

#[tokio::test]
async fn bounded_wait_times_out() {
    let locks = get_coordinator().await;
    let name = unique_name("timeout");
    let _held = locks.try_acquire(&name, TTL).await.unwrap().unwrap();

    let result = locks.acquire(&name, TTL, Duration::from_millis(150)).await;
    assert!(matches!(result, Err(LockError::Timeout { .. })));
}

#[tokio::test]
async fn ttl_expiry_allows_takeover() {
    let locks = get_coordinator().await;
    let name = unique_name("ttl");

    let stale = locks
        .try_acquire(&name, Duration::from_millis(100))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // lease expired server-side; a newcomer takes over
    let successor = locks.try_acquire(&name, TTL).await.unwrap();
    assert!(successor.is_some());

    // the stale guard's release is token-checked and must not free the
    // successor's lease
    drop(stale);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(locks.try_acquire(&name, TTL).await.unwrap().is_none());
}
