//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;

/// Errors raised by domain-level validation and state transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// Quantity must be a positive integer.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u32),

    /// An order status transition out of a terminal state was attempted.
    #[error("Invalid order transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}
