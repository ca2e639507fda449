//! Checkout facade: reconcile, then create the order.

use std::sync::Arc;

use common::{BuyerKey, Clock, ProductId, SystemClock, UserId};
use domain::{ClampedItem, Order};
use store::Store;
use tokio_util::sync::CancellationToken;

use crate::error::{CommerceError, Result};
use crate::order_factory::{OrderFactory, load_buyer_cart};
use crate::reconciler::CheckoutReconciler;

/// Result of a successful checkout.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: Order,
    /// Products dropped from the cart before the order was placed.
    pub removed: Vec<ProductId>,
    /// Lines reduced to the stock left before the order was placed.
    pub clamped: Vec<ClampedItem>,
}

impl CheckoutOutcome {
    /// Returns true if the order differs from what the buyer had in the cart.
    pub fn was_adjusted(&self) -> bool {
        !self.removed.is_empty() || !self.clamped.is_empty()
    }
}

/// Runs the whole checkout for a buyer.
pub struct Checkout<S: Store> {
    store: S,
    reconciler: CheckoutReconciler<S>,
    factory: OrderFactory<S>,
}

impl<S: Store> Checkout<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            reconciler: CheckoutReconciler::with_clock(store.clone(), clock.clone()),
            factory: OrderFactory::with_clock(store.clone(), clock),
            store,
        }
    }

    /// Reconciles the buyer's cart against live stock and converts it into
    /// an order.
    ///
    /// Adjustments made by reconciliation are reported in the outcome so the
    /// buyer can be told what changed.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(&self, buyer_key: &BuyerKey, user_id: UserId) -> Result<CheckoutOutcome> {
        self.checkout_with_cancel(buyer_key, user_id, &CancellationToken::new())
            .await
    }

    /// Like [`checkout`](Self::checkout), stopping with `Cancelled` if
    /// `cancel` fires before the order commit starts.
    ///
    /// A cancelled checkout leaves the cart as it was: reconciliation
    /// adjustments are only written once the token is known to be live.
    pub async fn checkout_with_cancel(
        &self,
        buyer_key: &BuyerKey,
        user_id: UserId,
        cancel: &CancellationToken,
    ) -> Result<CheckoutOutcome> {
        let cart = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CommerceError::Cancelled),
            cart = load_buyer_cart(&self.store, buyer_key, user_id) => cart?,
        };

        if cancel.is_cancelled() {
            return Err(CommerceError::Cancelled);
        }
        let reconciliation = self.reconciler.reconcile(cart.id()).await?;

        let order = self
            .factory
            .create_order_with_cancel(buyer_key, user_id, cancel)
            .await?;

        Ok(CheckoutOutcome {
            order,
            removed: reconciliation.removed,
            clamped: reconciliation.clamped,
        })
    }
}
