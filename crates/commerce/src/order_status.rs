//! Order status transitions and order lookups.

use std::sync::Arc;

use common::{Clock, OrderId, SystemClock, UserId};
use domain::{Order, OrderCode, OrderStatus, StatusChange};
use store::Store;

use crate::error::{CommerceError, Result};

/// Service for moving orders through their lifecycle.
///
/// Every accepted transition is written together with its audit record and
/// guarded by the order's version, so two administrators racing on the same
/// order cannot both succeed from the same starting state.
pub struct OrderStatusService<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: Store> OrderStatusService<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Moves an order to `target` on behalf of `actor_id`.
    ///
    /// Requesting the current status succeeds without writing anything.
    #[tracing::instrument(skip(self))]
    pub async fn transition(
        &self,
        order_id: OrderId,
        target: OrderStatus,
        actor_id: UserId,
    ) -> Result<Order> {
        let mut order = self.get_order(order_id).await?;

        let Some(change) = order.transition(target, actor_id, self.clock.now())? else {
            tracing::debug!(status = %target, "Order already in requested status");
            return Ok(order);
        };

        let version = self
            .store
            .record_status_change(&change, order.version())
            .await?;
        order.apply_status_change(&change);
        order.set_version(version);

        metrics::counter!(
            "order_status_transitions_total",
            "from" => change.from.as_str(),
            "to" => change.to.as_str()
        )
        .increment(1);
        tracing::info!(from = %change.from, to = %change.to, %actor_id, "Order status changed");

        Ok(order)
    }

    /// Audit trail of an order, oldest first.
    pub async fn history(&self, order_id: OrderId) -> Result<Vec<StatusChange>> {
        // Distinguish "no transitions yet" from "no such order"
        self.get_order(order_id).await?;
        Ok(self.store.status_history(order_id).await?)
    }

    /// Gets an order by ID.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| CommerceError::not_found("order", order_id))
    }

    /// Gets an order by its reference code.
    pub async fn get_order_by_code(&self, code: &OrderCode) -> Result<Order> {
        self.store
            .get_order_by_code(code)
            .await?
            .ok_or_else(|| CommerceError::not_found("order", code))
    }

    /// Orders placed by a user, newest first.
    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.store.orders_for_user(user_id).await?)
    }
}
