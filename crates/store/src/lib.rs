//! Authoritative store for the flash-sale engine.
//!
//! The store is the durable system of record for products, holds, orders,
//! and webhook records. Multi-entity invariants are serialized by the lock
//! coordinator above this layer; every operation here is individually
//! atomic, and the conditional stock debit is the race-free admission
//! primitive for the hold flow.

mod error;
mod memory;
mod postgres;
mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;
pub use store::StockStore;
