//! Order aggregate and related types.

mod aggregate;
mod code;
mod status;

pub use aggregate::{Order, OrderItem, OrderParts, StatusChange};
pub use code::OrderCode;
pub use status::{OrderStatus, ParseOrderStatusError};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    /// Order is not allowed to move to the requested status.
    #[error("Invalid status transition: cannot move order from {from} to {to} (allowed: {allowed})")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
        allowed: String,
    },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,
}

impl OrderError {
    pub(crate) fn invalid_transition(from: OrderStatus, to: OrderStatus) -> Self {
        OrderError::InvalidTransition {
            from,
            to,
            allowed: from.describe_targets(),
        }
    }
}
