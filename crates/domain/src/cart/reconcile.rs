//! Reconciliation of cart quantities against live stock.

use std::collections::HashMap;

use common::ProductId;
use serde::{Deserialize, Serialize};

use super::Cart;

/// A line whose quantity was reduced to what is in stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClampedItem {
    pub product_id: ProductId,
    /// Quantity the cart asked for.
    pub requested: u32,
    /// Quantity left after clamping (the live stock).
    pub available: u32,
}

/// The changes needed to make a cart sellable against current stock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    removed: Vec<ProductId>,
    clamped: Vec<ClampedItem>,
}

impl ReconciliationPlan {
    /// Compares every line with the live stock in `stock`.
    ///
    /// Products missing from `stock` count as zero stock. Zero stock removes
    /// the line; stock below the requested quantity clamps it; otherwise the
    /// line is left alone.
    pub fn for_cart(cart: &Cart, stock: &HashMap<ProductId, u32>) -> Self {
        let mut plan = Self::default();

        for item in cart.items() {
            let available = stock.get(&item.product_id).copied().unwrap_or(0);
            if available == 0 {
                plan.removed.push(item.product_id.clone());
            } else if available < item.quantity {
                plan.clamped.push(ClampedItem {
                    product_id: item.product_id.clone(),
                    requested: item.quantity,
                    available,
                });
            }
        }

        plan
    }

    /// Products whose lines are dropped entirely.
    pub fn removed(&self) -> &[ProductId] {
        &self.removed
    }

    /// Lines reduced to the available stock.
    pub fn clamped(&self) -> &[ClampedItem] {
        &self.clamped
    }

    /// Returns true if the cart already matches live stock.
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.clamped.is_empty()
    }

    pub fn into_parts(self) -> (Vec<ProductId>, Vec<ClampedItem>) {
        (self.removed, self.clamped)
    }
}
