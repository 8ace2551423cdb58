use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{LockCoordinator, LockError, Result};

/// How long a contender sleeps between acquisition attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
struct Lease {
    token: Uuid,
    expires_at: Instant,
}

type LeaseTable = Arc<Mutex<HashMap<String, Lease>>>;

/// In-process lock coordinator.
///
/// A mutex-guarded lease table with the same observable semantics as the
/// Redis implementation: named leases, TTL takeover, token-checked release.
#[derive(Clone, Default)]
pub struct InMemoryLockCoordinator {
    leases: LeaseTable,
}

impl InMemoryLockCoordinator {
    /// Creates a new coordinator with no leases held.
    pub fn new() -> Self {
        Self::default()
    }

    fn try_insert(&self, name: &str, ttl: Duration) -> Option<InMemoryLockGuard> {
        let mut leases = self.leases.lock().unwrap();
        let now = Instant::now();
        match leases.get(name) {
            Some(lease) if lease.expires_at > now => None,
            _ => {
                let token = Uuid::new_v4();
                leases.insert(
                    name.to_string(),
                    Lease {
                        token,
                        expires_at: now + ttl,
                    },
                );
                Some(InMemoryLockGuard {
                    leases: self.leases.clone(),
                    name: name.to_string(),
                    token,
                })
            }
        }
    }
}

#[async_trait]
impl LockCoordinator for InMemoryLockCoordinator {
    type Guard = InMemoryLockGuard;

    async fn acquire(&self, name: &str, ttl: Duration, wait: Duration) -> Result<Self::Guard> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(guard) = self.try_insert(name, ttl) {
                return Ok(guard);
            }
            if Instant::now() >= deadline {
                return Err(LockError::Timeout {
                    name: name.to_string(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn try_acquire(&self, name: &str, ttl: Duration) -> Result<Option<Self::Guard>> {
        Ok(self.try_insert(name, ttl))
    }
}

/// Lease handle; dropping it releases the lock.
///
/// Release is token-checked: a guard whose lease already expired and was
/// overtaken does not release the successor's lease.
pub struct InMemoryLockGuard {
    leases: LeaseTable,
    name: String,
    token: Uuid,
}

impl Drop for InMemoryLockGuard {
    fn drop(&mut self) {
        let mut leases = self.leases.lock().unwrap();
        if leases
            .get(&self.name)
            .is_some_and(|lease| lease.token == self.token)
        {
            leases.remove(&self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn acquire_and_release_on_drop() {
        let locks = InMemoryLockCoordinator::new();

        let guard = locks.acquire("a", TTL, Duration::from_millis(50)).await.unwrap();
        assert!(locks.try_acquire("a", TTL).await.unwrap().is_none());

        drop(guard);
        assert!(locks.try_acquire("a", TTL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn names_are_independent() {
        let locks = InMemoryLockCoordinator::new();
        let _a = locks.try_acquire("a", TTL).await.unwrap().unwrap();
        assert!(locks.try_acquire("b", TTL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn bounded_wait_times_out() {
        let locks = InMemoryLockCoordinator::new();
        let _held = locks.try_acquire("a", TTL).await.unwrap().unwrap();

        let result = locks.acquire("a", TTL, Duration::from_millis(40)).await;
        assert!(matches!(result, Err(LockError::Timeout { name }) if name == "a"));
    }

    #[tokio::test]
    async fn waiter_gets_the_lock_when_released() {
        let locks = InMemoryLockCoordinator::new();
        let guard = locks.try_acquire("a", TTL).await.unwrap().unwrap();

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("a", TTL, Duration::from_secs(2)).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(guard);

        let result = contender.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn expired_lease_is_overtaken() {
        let locks = InMemoryLockCoordinator::new();
        let stale = locks
            .try_acquire("a", Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        // the lease expired, so a newcomer may take over
        let successor = locks.try_acquire("a", TTL).await.unwrap();
        assert!(successor.is_some());

        // the stale guard must not release the successor's lease
        drop(stale);
        assert!(locks.try_acquire("a", TTL).await.unwrap().is_none());
    }
}
