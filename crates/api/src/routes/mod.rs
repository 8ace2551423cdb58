pub mod health;
pub mod holds;
pub mod metrics;
pub mod orders;
pub mod products;
pub mod reservations;
pub mod webhooks;
