//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `PAYMENT_WEBHOOK_SECRET` — shared secret for webhook signatures
///   (default: `"dev-secret"`)
/// - `HOLD_TTL_SECS` — checkout window per hold (default: `120`)
/// - `LOCK_WAIT_SECS` — wait budget for product/hold/order locks
///   (default: `5`)
/// - `WEBHOOK_LOCK_WAIT_SECS` — wait budget for idempotency-key locks
///   (default: `10`)
/// - `SWEEP_INTERVAL_SECS` — expired-hold sweep cadence (default: `10`)
/// - `REAP_INTERVAL_SECS` — stale-order reap cadence (default: `60`)
/// - `STALE_ORDER_SECS` — pending age before an order is reaped
///   (default: `120`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub payment_secret: String,
    pub hold_ttl_secs: u64,
    pub lock_wait_secs: u64,
    pub webhook_lock_wait_secs: u64,
    pub sweep_interval_secs: u64,
    pub reap_interval_secs: u64,
    pub stale_order_secs: u64,
    pub log_level: String,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3000),
            payment_secret: std::env::var("PAYMENT_WEBHOOK_SECRET")
                .unwrap_or_else(|_| "dev-secret".to_string()),
            hold_ttl_secs: env_parse("HOLD_TTL_SECS", 120),
            lock_wait_secs: env_parse("LOCK_WAIT_SECS", 5),
            webhook_lock_wait_secs: env_parse("WEBHOOK_LOCK_WAIT_SECS", 10),
            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS", 10),
            reap_interval_secs: env_parse("REAP_INTERVAL_SECS", 60),
            stale_order_secs: env_parse("STALE_ORDER_SECS", 120),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checkout window granted to each hold.
    pub fn hold_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.hold_ttl_secs as i64)
    }

    /// Wait budget for product/hold/order locks.
    pub fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait_secs)
    }

    /// Wait budget for webhook idempotency-key locks.
    pub fn webhook_lock_wait(&self) -> Duration {
        Duration::from_secs(self.webhook_lock_wait_secs)
    }

    /// Pending age beyond which an unpaid order is reaped.
    pub fn stale_order_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_order_secs as i64)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            payment_secret: "dev-secret".to_string(),
            hold_ttl_secs: 120,
            lock_wait_secs: 5,
            webhook_lock_wait_secs: 10,
            sweep_interval_secs: 10,
            reap_interval_secs: 60,
            stale_order_secs: 120,
            log_level: "info".to_string(),
        }
    }
}
