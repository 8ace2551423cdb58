use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use uuid::Uuid;

use crate::{LockCoordinator, LockError, Result};

/// How long a contender sleeps between acquisition attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Token-checked release: only the current holder's token may delete the key.
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Redis-backed lock coordinator using `SET NX PX` leases.
#[derive(Clone)]
pub struct RedisLockCoordinator {
    conn: ConnectionManager,
}

impl RedisLockCoordinator {
    /// Connects to Redis at `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    /// Wraps an existing connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    async fn try_set(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(acquired.is_some())
    }

    fn guard(&self, key: String, token: String) -> RedisLockGuard {
        RedisLockGuard {
            conn: self.conn.clone(),
            key,
            token,
        }
    }
}

#[async_trait]
impl LockCoordinator for RedisLockCoordinator {
    type Guard = RedisLockGuard;

    async fn acquire(&self, name: &str, ttl: Duration, wait: Duration) -> Result<Self::Guard> {
        let key = format!("lock:{name}");
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + wait;

        loop {
            if self.try_set(&key, &token, ttl).await? {
                return Ok(self.guard(key, token));
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
        let key = format!("lock:{name}");
        let token = Uuid::new_v4().to_string();
        if self.try_set(&key, &token, ttl).await? {
            Ok(Some(self.guard(key, token)))
        } else {
            Ok(None)
        }
    }
}

/// Lease handle; dropping it schedules a token-checked release.
///
/// Release runs on the runtime when one is available; otherwise the lease
/// simply expires at its TTL.
pub struct RedisLockGuard {
    conn: ConnectionManager,
    key: String,
    token: String,
}

impl Drop for RedisLockGuard {
    fn drop(&mut self) {
        let mut conn = self.conn.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let released: std::result::Result<i64, _> = Script::new(RELEASE_SCRIPT)
                    .key(&key)
                    .arg(&token)
                    .invoke_async(&mut conn)
                    .await;
                if let Err(e) = released {
                    tracing::warn!(%key, error = %e, "failed to release lock, lease will expire");
                }
            });
        }
    }
}
