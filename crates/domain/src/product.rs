//! Product entity.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// A sellable product as the authoritative store records it.
///
/// `stock` is the system-of-record quantity. A fast-path ledger may mirror
/// it for admission control; the mirror is never more authoritative than the
/// reconciliation rules in the settlement flow allow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Unit price in minor-currency units.
    pub price: Money,
    /// Remaining authoritative stock. Guarded mutations keep it non-negative.
    pub stock: i64,
}

impl Product {
    /// Creates a product with a fresh identifier.
    pub fn new(name: impl Into<String>, price: Money, stock: i64) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            price,
            stock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_assigns_unique_ids() {
        let a = Product::new("Item A", Money::from_cents(100), 10);
        let b = Product::new("Item B", Money::from_cents(100), 10);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn serialization_roundtrip() {
        let product = Product::new("Flash Sale Item", Money::from_cents(20000), 1000);
        let json = serde_json::to_string(&product).unwrap();
        let back: Product = serde_json::from_str(&json).unwrap();
        assert_eq!(product, back);
    }
}
