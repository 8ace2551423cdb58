use async_trait::async_trait;
use common::ProductId;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use crate::{Result, StockLedger};

/// Check-and-decrement executed server-side so the check and the mutation
/// are one operation.
const DECREMENT_SCRIPT: &str = r#"
local stock = tonumber(redis.call('GET', KEYS[1]) or '0')
local qty = tonumber(ARGV[1])

if stock >= qty then
    redis.call('DECRBY', KEYS[1], qty)
    return 1
else
    return 0
end
"#;

/// Redis-backed ledger.
///
/// One counter key per product; the conditional decrement runs as a Lua
/// script so concurrent admission attempts serialize inside Redis.
#[derive(Clone)]
pub struct RedisStockLedger {
    conn: ConnectionManager,
    decrement: Script,
}

impl RedisStockLedger {
    /// Connects to Redis at `redis_url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    /// Wraps an existing connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            decrement: Script::new(DECREMENT_SCRIPT),
        }
    }

    fn stock_key(product_id: ProductId) -> String {
        format!("product:{product_id}:stock")
    }
}

#[async_trait]
impl StockLedger for RedisStockLedger {
    async fn initialize(&self, product_id: ProductId, qty: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(Self::stock_key(product_id), qty).await?;
        Ok(())
    }

    async fn decrement_if_available(&self, product_id: ProductId, qty: u32) -> Result<bool> {
        let mut conn = self.conn.clone();
        let granted: i64 = self
            .decrement
            .key(Self::stock_key(product_id))
            .arg(i64::from(qty))
            .invoke_async(&mut conn)
            .await?;
        Ok(granted == 1)
    }

    async fn increment(&self, product_id: ProductId, qty: u32) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .incr(Self::stock_key(product_id), i64::from(qty))
            .await?;
        Ok(())
    }

    async fn read(&self, product_id: ProductId) -> Result<i64> {
        let mut conn = self.conn.clone();
        let stock: Option<i64> = conn.get(Self::stock_key(product_id)).await?;
        Ok(stock.unwrap_or(0))
    }

    async fn contains(&self, product_id: ProductId) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(Self::stock_key(product_id)).await?)
    }
}
