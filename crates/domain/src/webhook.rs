//! Webhook record: the durable side of the idempotency protocol.

use chrono::{DateTime, Utc};
use common::IdempotencyKey;
use serde::{Deserialize, Serialize};

use crate::order::{OrderKey, OrderStatus, PaymentOutcome};

/// Processing state of a received payment notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    /// Recorded but not yet applied (the order did not exist on arrival).
    Pending,
    /// Side effects ran, or the event was a duplicate of a terminal order.
    Processed,
}

impl WebhookStatus {
    /// Returns the stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookStatus::Pending => "pending",
            WebhookStatus::Processed => "processed",
        }
    }

    /// Parses the stored representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WebhookStatus::Pending),
            "processed" => Some(WebhookStatus::Processed),
            _ => None,
        }
    }
}

/// The validated payment-event payload: which order, which verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub order: OrderKey,
    pub outcome: PaymentOutcome,
}

/// One payment notification, unique per idempotency key.
///
/// A record moves `Pending -> Processed` exactly once; stock and order
/// mutations happen only on that transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRecord {
    pub idempotency_key: IdempotencyKey,
    pub payload: WebhookPayload,
    pub status: WebhookStatus,
    /// Delivery attempts observed for this key.
    pub attempts: u32,
    /// Order status at the moment the record was processed.
    pub applied: Option<OrderStatus>,
    pub received_at: DateTime<Utc>,
}
