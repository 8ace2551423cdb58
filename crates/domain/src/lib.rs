//! Domain layer for the flash-sale reservation engine.
//!
//! Entities are plain serializable structs; the only behavior they carry is
//! what must hold regardless of storage: hold expiry, the order status state
//! machine, and webhook payload shape.

mod error;
mod hold;
mod order;
mod product;
mod webhook;

pub use error::DomainError;
pub use hold::Hold;
pub use order::{Order, OrderKey, OrderStatus, PaymentOutcome, StockDebit};
pub use product::Product;
pub use webhook::{WebhookPayload, WebhookRecord, WebhookStatus};
