//! Out-of-band durable order creation for ledger-admitted reservations.

use std::time::Duration;

use common::{OrderReference, ProductId};
use ledger::StockLedger;
use locks::LockCoordinator;
use store::StockStore;
use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::orders::OrderSettlement;

/// A reservation the ledger already admitted, awaiting its durable order.
#[derive(Debug, Clone)]
pub struct ReservationJob {
    pub product_id: ProductId,
    pub qty: u32,
    pub reference: OrderReference,
}

/// Queue feeding the background worker that persists reservation orders.
///
/// Retryable failures (store or ledger unavailable, lock timeouts) are
/// retried with backoff; a permanent failure returns the admitted units to
/// the ledger so an in-flight failure never leaks stock.
#[derive(Clone)]
pub struct ReservationQueue {
    tx: mpsc::Sender<ReservationJob>,
}

impl ReservationQueue {
    /// Default retry backoff schedule.
    pub fn default_backoff() -> Vec<Duration> {
        vec![
            Duration::from_secs(1),
            Duration::from_secs(5),
            Duration::from_secs(10),
        ]
    }

    /// Starts the worker task and returns the queue handle.
    pub fn start<S, G, L>(
        settlement: OrderSettlement<S, G, L>,
        ledger: G,
        backoff: Vec<Duration>,
    ) -> Self
    where
        S: StockStore + Clone + Send + Sync + 'static,
        G: StockLedger + Clone + Send + Sync + 'static,
        L: LockCoordinator + Clone + Send + Sync + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<ReservationJob>(1024);

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                process_job(&settlement, &ledger, &backoff, job).await;
            }
            tracing::info!("reservation queue worker stopped");
        });

        Self { tx }
    }

    /// Enqueues a job for durable order creation.
    pub async fn enqueue(&self, job: ReservationJob) -> Result<(), EngineError> {
        self.tx
            .send(job)
            .await
            .map_err(|_| EngineError::Dependency("reservation queue is not running".to_string()))
    }
}

async fn process_job<S, G, L>(
    settlement: &OrderSettlement<S, G, L>,
    ledger: &G,
    backoff: &[Duration],
    job: ReservationJob,
) where
    S: StockStore + Clone,
    G: StockLedger + Clone,
    L: LockCoordinator + Clone,
{
    let max_attempts = backoff.len() + 1;

    for attempt in 1..=max_attempts {
        match settlement
            .create_from_reservation(job.product_id, job.qty, job.reference.clone())
            .await
        {
            Ok(order) => {
                metrics::counter!("reservation_jobs_completed_total").increment(1);
                tracing::info!(
                    order_reference = %job.reference,
                    order_id = %order.id,
                    status = %order.status,
                    "reservation order persisted"
                );
                return;
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    order_reference = %job.reference,
                    attempt,
                    error = %e,
                    "order creation failed, retrying"
                );
                tokio::time::sleep(backoff[attempt - 1]).await;
            }
            Err(e) => {
                // permanent failure: give the admitted units back so the
                // ledger's count matches reality
                if let Err(credit_err) = ledger.increment(job.product_id, job.qty).await {
                    tracing::error!(
                        order_reference = %job.reference,
                        product_id = %job.product_id,
                        qty = job.qty,
                        error = %credit_err,
                        "compensating ledger credit failed; stock requires manual reconciliation"
                    );
                } else {
                    metrics::counter!("reservation_compensations_total").increment(1);
                }
                tracing::error!(
                    order_reference = %job.reference,
                    error = %e,
                    "order creation failed permanently, reserved units returned"
                );
                return;
            }
        }
    }
}
