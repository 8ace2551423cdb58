//! Hold entity: a time-bounded claim on product stock.

use chrono::{DateTime, Duration, Utc};
use common::{HoldId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A temporary claim on `qty` units of a product.
///
/// While a hold exists its quantity has already been subtracted from the
/// authoritative stock exactly once. A hold ends either by conversion into
/// an order or by expiry reclamation, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    pub id: HoldId,
    pub product_id: ProductId,
    pub qty: u32,
    pub expire_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Hold {
    /// Creates a hold expiring `ttl` from `now`.
    pub fn new(
        product_id: ProductId,
        qty: u32,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if qty == 0 {
            return Err(DomainError::InvalidQuantity(qty));
        }
        Ok(Self {
            id: HoldId::new(),
            product_id,
            qty,
            expire_at: now + ttl,
            created_at: now,
        })
    }

    /// Whether the hold's deadline has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at <= now
    }
}
