//! Background reclamation loops.

use std::time::Duration;

use ledger::StockLedger;
use locks::LockCoordinator;
use store::StockStore;
use tokio::task::JoinHandle;

use crate::holds::HoldManager;
use crate::orders::OrderSettlement;

/// Spawns the periodic expired-hold sweep.
///
/// Safe to run on several workers at once; the sweep's own lease ensures a
/// single active pass. Errors are logged and the loop keeps ticking.
pub fn spawn_expiry_sweeper<S, L>(holds: HoldManager<S, L>, interval: Duration) -> JoinHandle<()>
where
    S: StockStore + Clone + Send + Sync + 'static,
    L: LockCoordinator + Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match holds.release_expired().await {
                Ok(released) if released > 0 => {
                    tracing::info!(released, "expiry sweep released holds");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
            }
        }
    })
}

/// Spawns the periodic stale-order reaper: pending orders older than
/// `max_age` are cancelled and their stock released.
pub fn spawn_stale_order_reaper<S, G, L>(
    settlement: OrderSettlement<S, G, L>,
    interval: Duration,
    max_age: chrono::Duration,
) -> JoinHandle<()>
where
    S: StockStore + Clone + Send + Sync + 'static,
    G: StockLedger + Clone + Send + Sync + 'static,
    L: LockCoordinator + Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match settlement.release_stale_orders(max_age).await {
                Ok(cancelled) if cancelled > 0 => {
                    tracing::info!(cancelled, "stale-order reap cancelled unpaid orders");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "stale-order reap failed"),
            }
        }
    })
}
