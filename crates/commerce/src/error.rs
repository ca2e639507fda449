//! Service error types.

use common::ProductId;
use domain::{CartError, OrderError, OrderStatus};
use store::StoreError;
use thiserror::Error;

/// Errors returned to callers of the commerce services.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// A referenced cart, product, item, order or account does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Requested more units than are in stock.
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Checkout of a missing or empty cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// The order cannot move to the requested status.
    #[error("Invalid status transition: cannot move order from {from} to {to} (allowed: {allowed})")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
        allowed: String,
    },

    /// The record changed concurrently and the operation gave up.
    #[error("Concurrent modification of {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    /// Quantity must be greater than zero.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// The caller cancelled the operation before it committed.
    #[error("Operation cancelled")]
    Cancelled,

    /// The notifier could not deliver a message.
    #[error("Notification failed: {0}")]
    Notification(String),

    /// Any other persistence failure.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl CommerceError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CommerceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Short stable label, used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CommerceError::NotFound { .. } => "not_found",
            CommerceError::InsufficientStock { .. } => "insufficient_stock",
            CommerceError::EmptyCart => "empty_cart",
            CommerceError::InvalidTransition { .. } => "invalid_transition",
            CommerceError::Conflict { .. } => "conflict",
            CommerceError::InvalidQuantity { .. } => "invalid_quantity",
            CommerceError::Cancelled => "cancelled",
            CommerceError::Notification(_) => "notification",
            CommerceError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for CommerceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrencyConflict { entity, id, .. } => {
                CommerceError::Conflict { entity, id }
            }
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => CommerceError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            StoreError::NotFound { entity, id } => CommerceError::NotFound { entity, id },
            other => CommerceError::Store(other),
        }
    }
}

impl From<CartError> for CommerceError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::ItemNotFound { product_id } => {
                CommerceError::not_found("cart item", product_id)
            }
            CartError::InvalidQuantity { quantity } => CommerceError::InvalidQuantity { quantity },
            CartError::InsufficientStock {
                product_id,
                requested,
                available,
            } => CommerceError::InsufficientStock {
                product_id,
                requested,
                available,
            },
        }
    }
}

impl From<OrderError> for CommerceError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { from, to, allowed } => {
                CommerceError::InvalidTransition { from, to, allowed }
            }
            OrderError::NoItems => CommerceError::EmptyCart,
        }
    }
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, CommerceError>;
