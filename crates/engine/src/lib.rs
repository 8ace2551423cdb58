//! The stock-reservation and order-settlement core.
//!
//! Request handlers and background workers drive four components:
//!
//! - [`HoldManager`] — time-bounded claims against authoritative stock and
//!   the expiry sweep that reclaims abandoned ones.
//! - [`OrderSettlement`] — converts holds and ledger-admitted reservations
//!   into orders and applies payment outcomes exactly once.
//! - [`WebhookReconciler`] — the idempotency-key protocol over payment
//!   notifications, tolerant of duplicates and early arrival.
//! - [`ReservationQueue`] — out-of-band durable order creation with retry
//!   and a compensating ledger credit on permanent failure.
//!
//! Everything that reads-then-writes shared state runs under a named lease
//! from the lock coordinator or through a single-operation atomic primitive.

mod cache;
mod error;
mod holds;
mod orders;
mod products;
mod queue;
mod signature;
mod sweeper;
mod webhooks;

pub use cache::ProductSnapshotCache;
pub use error::EngineError;
pub use holds::HoldManager;
pub use orders::{OrderSettlement, Settlement};
pub use products::{ProductReader, ProductView};
pub use queue::{ReservationJob, ReservationQueue};
pub use signature::SignatureVerifier;
pub use sweeper::{spawn_expiry_sweeper, spawn_stale_order_reaper};
pub use webhooks::{WebhookDisposition, WebhookReconciler};
