//! HTTP API for the flash-sale reservation engine.
//!
//! Exposes product reads, hold creation, hold-to-order conversion, the
//! asynchronous reservation path, and the payment webhook, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use common::Money;
use domain::Product;
use engine::{
    HoldManager, OrderSettlement, ProductReader, ProductSnapshotCache, ReservationQueue,
    SignatureVerifier, WebhookReconciler,
};
use ledger::InMemoryStockLedger;
use locks::InMemoryLockCoordinator;
use metrics_exporter_prometheus::PrometheusHandle;
use store::StockStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: StockStore + Clone> {
    pub products: ProductReader<S, InMemoryStockLedger>,
    pub holds: HoldManager<S, InMemoryLockCoordinator>,
    pub settlement: OrderSettlement<S, InMemoryStockLedger, InMemoryLockCoordinator>,
    pub reconciler: WebhookReconciler<S, InMemoryStockLedger, InMemoryLockCoordinator>,
    pub queue: ReservationQueue,
    pub ledger: InMemoryStockLedger,
    pub verifier: SignatureVerifier,
    pub store: S,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: StockStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products/{id}", get(routes::products::show::<S>))
        .route("/holds", post(routes::holds::create::<S>))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{key}", get(routes::orders::show::<S>))
        .route("/reservations", post(routes::reservations::create::<S>))
        .route("/payments/webhook", post(routes::webhooks::handle::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state with the in-memory ledger and lock
/// coordinator, and starts the reservation queue worker.
pub fn create_default_state<S>(store: S, config: &Config) -> Arc<AppState<S>>
where
    S: StockStore + Clone + Send + Sync + 'static,
{
    let ledger = InMemoryStockLedger::new();
    let locks = InMemoryLockCoordinator::new();
    let cache = ProductSnapshotCache::default();

    let settlement = OrderSettlement::new(
        store.clone(),
        ledger.clone(),
        locks.clone(),
        cache.clone(),
        config.lock_wait(),
    );
    let queue = ReservationQueue::start(
        settlement.clone(),
        ledger.clone(),
        ReservationQueue::default_backoff(),
    );

    Arc::new(AppState {
        products: ProductReader::new(store.clone(), ledger.clone()),
        holds: HoldManager::new(
            store.clone(),
            locks.clone(),
            cache,
            config.hold_ttl(),
            config.lock_wait(),
        ),
        reconciler: WebhookReconciler::new(
            store.clone(),
            settlement.clone(),
            locks,
            config.webhook_lock_wait(),
        ),
        settlement,
        queue,
        ledger,
        verifier: SignatureVerifier::new(&config.payment_secret),
        store,
    })
}

/// Seeds the demo catalog and primes the ledger from it.
pub async fn seed_demo_products<S>(state: &AppState<S>) -> Result<(), ApiError>
where
    S: StockStore + Clone,
{
    for (name, price_cents, stock) in [
        ("Flash Sale Item 1", 20000, 1000),
        ("Flash Sale Item 2", 100, 500),
    ] {
        let product = Product::new(name, Money::from_cents(price_cents), stock);
        state
            .store
            .insert_product(product)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
    }
    state.products.sync_to_ledger().await?;
    Ok(())
}
