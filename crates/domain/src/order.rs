//! Order entity and its status state machine.

use chrono::{DateTime, Utc};
use common::{HoldId, Money, OrderId, OrderReference, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::hold::Hold;

/// The state of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Paid
///    │
///    └──────► Cancelled
/// ```
///
/// `Paid` and `Cancelled` are terminal; no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Awaiting the payment outcome.
    #[default]
    Pending,
    /// Payment succeeded (terminal).
    Paid,
    /// Payment failed, hold expired unpaid, or operator cancellation (terminal).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Cancelled)
    }

    /// Returns the status name as stored and served.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Parses the stored representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "paid" => Some(OrderStatus::Paid),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where an order's stock was debited at admission time.
///
/// Settlement and every compensating path route stock back to the recorded
/// origin and nowhere else; the two flows never mix within one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockDebit {
    /// Hold-conversion flow: the authoritative store was debited when the
    /// hold was created.
    Store,
    /// Direct-reservation flow: the fast-path ledger was debited at request
    /// time; the store is debited only when the order settles as paid.
    Ledger,
}

impl StockDebit {
    /// Returns the stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            StockDebit::Store => "store",
            StockDebit::Ledger => "ledger",
        }
    }

    /// Parses the stored representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "store" => Some(StockDebit::Store),
            "ledger" => Some(StockDebit::Ledger),
            _ => None,
        }
    }
}

/// The payment provider's verdict for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Success,
    Failure,
}

impl PaymentOutcome {
    /// Parses the wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(PaymentOutcome::Success),
            "failure" => Some(PaymentOutcome::Failure),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentOutcome::Success => write!(f, "success"),
            PaymentOutcome::Failure => write!(f, "failure"),
        }
    }
}

/// How an external party addresses an order: by its row id or by the
/// reference handed out at reservation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKey {
    Id(OrderId),
    Reference(OrderReference),
}

impl OrderKey {
    /// Whether this key addresses the given order.
    pub fn matches(&self, order: &Order) -> bool {
        match self {
            OrderKey::Id(id) => *id == order.id,
            OrderKey::Reference(reference) => *reference == order.reference,
        }
    }
}

impl std::fmt::Display for OrderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKey::Id(id) => write!(f, "{id}"),
            OrderKey::Reference(reference) => write!(f, "{reference}"),
        }
    }
}

impl From<OrderId> for OrderKey {
    fn from(id: OrderId) -> Self {
        OrderKey::Id(id)
    }
}

impl From<OrderReference> for OrderKey {
    fn from(reference: OrderReference) -> Self {
        OrderKey::Reference(reference)
    }
}

/// An order awaiting or past settlement.
///
/// `amount` is derived as `price × qty` once at creation and never
/// recomputed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub reference: OrderReference,
    /// The hold this order consumed, when created through the hold flow.
    pub hold_id: Option<HoldId>,
    pub product_id: ProductId,
    pub qty: u32,
    pub amount: Money,
    pub status: OrderStatus,
    pub debit: StockDebit,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a pending order consuming a hold; stock was already debited
    /// from the authoritative store when the hold was created.
    pub fn from_hold(hold: &Hold, unit_price: Money, now: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::new(),
            reference: OrderReference::generate(),
            hold_id: Some(hold.id),
            product_id: hold.product_id,
            qty: hold.qty,
            amount: unit_price.multiply(hold.qty),
            status: OrderStatus::Pending,
            debit: StockDebit::Store,
            created_at: now,
        }
    }

    /// Creates a pending order for a reservation already admitted by the
    /// fast-path ledger.
    pub fn from_reservation(
        product_id: ProductId,
        qty: u32,
        reference: OrderReference,
        unit_price: Money,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if qty == 0 {
            return Err(DomainError::InvalidQuantity(qty));
        }
        Ok(Self {
            id: OrderId::new(),
            reference,
            hold_id: None,
            product_id,
            qty,
            amount: unit_price.multiply(qty),
            status: OrderStatus::Pending,
            debit: StockDebit::Ledger,
            created_at: now,
        })
    }

    /// Applies a status transition, rejecting terminal re-entry.
    pub fn transition(&mut self, to: OrderStatus) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}
