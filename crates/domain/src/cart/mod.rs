//! Cart aggregate and related types.

mod aggregate;
mod reconcile;

pub use aggregate::{Cart, CartItem, CartParts};
pub use reconcile::{ClampedItem, ReconciliationPlan};

use common::ProductId;
use thiserror::Error;

/// Errors that can occur during cart mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    /// Item not found in cart.
    #[error("Item not found in cart: {product_id}")]
    ItemNotFound { product_id: ProductId },

    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// The requested quantity exceeds what is in stock right now.
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },
}
