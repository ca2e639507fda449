//! Checkout reconciliation against live stock.

use std::collections::HashMap;
use std::sync::Arc;

use common::{CartId, Clock, ProductId, SystemClock};
use domain::{Cart, ClampedItem, ReconciliationPlan};
use store::Store;

use crate::error::{CommerceError, Result};

/// Outcome of reconciling a cart.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// The cart after adjustments, with refreshed pricing.
    pub cart: Cart,
    /// Products dropped because they are out of stock or gone.
    pub removed: Vec<ProductId>,
    /// Lines reduced to the remaining stock.
    pub clamped: Vec<ClampedItem>,
}

impl Reconciliation {
    /// Returns true if the cart was left untouched.
    pub fn is_unchanged(&self) -> bool {
        self.removed.is_empty() && self.clamped.is_empty()
    }
}

/// Adjusts a cart to what can actually be sold right now.
pub struct CheckoutReconciler<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: Store> CheckoutReconciler<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Re-reads stock for every line, removing sold-out lines and clamping
    /// lines that ask for more than what is left.
    ///
    /// All adjustments are saved as one versioned update. Nothing is written
    /// when the cart already fits the stock, so running it twice in a row
    /// yields the same cart.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, cart_id: CartId) -> Result<Reconciliation> {
        let mut cart = self
            .store
            .get_cart(cart_id)
            .await?
            .ok_or_else(|| CommerceError::not_found("cart", cart_id))?;

        if cart.is_empty() {
            return Err(CommerceError::EmptyCart);
        }

        let catalog = self.store.get_products(&cart.product_ids()).await?;
        let stock: HashMap<ProductId, u32> = catalog
            .iter()
            .map(|(id, product)| (id.clone(), product.sellable_stock()))
            .collect();

        let plan = ReconciliationPlan::for_cart(&cart, &stock);
        cart.refresh_pricing(&catalog);

        if !plan.is_empty() {
            cart.apply_reconciliation(&plan, self.clock.now());
            let version = self.store.save_cart(&cart).await?;
            cart.set_version(version);

            tracing::info!(
                removed = plan.removed().len(),
                clamped = plan.clamped().len(),
                "Cart reconciled against live stock"
            );
        }

        let (removed, clamped) = plan.into_parts();
        Ok(Reconciliation {
            cart,
            removed,
            clamped,
        })
    }
}
