//! Shared types used across the flash-sale engine crates.

mod types;

pub use types::{HoldId, IdempotencyKey, Money, OrderId, OrderReference, ProductId};
