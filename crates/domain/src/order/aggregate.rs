//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, Percent, ProductId, UserId, Version};
use serde::{Deserialize, Serialize};

use crate::pricing::{PricedLine, Totals};
use crate::product::Product;

use super::{OrderCode, OrderError, OrderStatus};

/// A line of a placed order.
///
/// Every catalog field is copied by value when the order is placed, so
/// later catalog edits never reach historical orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price at the moment the order was placed.
    pub unit_price: Money,
    pub title: String,
    pub description: String,
    pub image: Option<String>,
    /// Discount at the moment the order was placed.
    pub discount: Percent,
}

impl OrderItem {
    /// Snapshots a product for `quantity` units.
    pub fn snapshot(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id.clone(),
            quantity,
            unit_price: product.price,
            title: product.title.clone(),
            description: product.description.clone(),
            image: product.image.clone(),
            discount: product.discount,
        }
    }
}

impl PricedLine for OrderItem {
    fn unit_price(&self) -> Money {
        self.unit_price
    }

    fn quantity(&self) -> u32 {
        self.quantity
    }

    fn discount(&self) -> Percent {
        self.discount
    }
}

/// Append-only audit record of a status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub order_id: OrderId,
    /// Administrator who requested the change.
    pub actor_id: UserId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed_at: DateTime<Utc>,
}

/// Persisted fields of an order, used by stores to rebuild the aggregate.
#[derive(Debug, Clone)]
pub struct OrderParts {
    pub id: OrderId,
    pub code: OrderCode,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub total: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: Version,
}

/// Order aggregate root.
///
/// Created once from a reconciled cart. Afterwards only the status (and its
/// `updated_at` stamp) ever changes; totals and lines are write-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    code: OrderCode,
    user_id: UserId,
    status: OrderStatus,
    items: Vec<OrderItem>,
    /// Totals frozen at placement.
    totals: Totals,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Current version for optimistic concurrency.
    #[serde(default)]
    version: Version,
}

// Construction
impl Order {
    /// Places a new order in `Pending` status with totals computed from `items`.
    pub fn place(
        id: OrderId,
        code: OrderCode,
        user_id: UserId,
        items: Vec<OrderItem>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }

        let totals = Totals::of(&items);
        Ok(Self {
            id,
            code,
            user_id,
            status: OrderStatus::Pending,
            items,
            totals,
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        })
    }

    /// Rebuilds an order from its persisted fields.
    ///
    /// Stored totals are taken as-is: they were frozen at placement.
    pub fn rehydrate(parts: OrderParts) -> Self {
        Self {
            id: parts.id,
            code: parts.code,
            user_id: parts.user_id,
            status: parts.status,
            items: parts.items,
            totals: Totals {
                subtotal: parts.subtotal,
                total: parts.total,
            },
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            version: parts.version,
        }
    }

    /// Replaces the reference code, used when the store reports a collision.
    pub fn with_code(mut self, code: OrderCode) -> Self {
        self.code = code;
        self
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn code(&self) -> &OrderCode {
        &self.code
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Returns the line for a product, if present.
    pub fn get_item(&self, product_id: &ProductId) -> Option<&OrderItem> {
        self.items.iter().find(|item| &item.product_id == product_id)
    }

    pub fn subtotal(&self) -> Money {
        self.totals.subtotal
    }

    pub fn total(&self) -> Money {
        self.totals.total
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Returns true if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Status changes
impl Order {
    /// Validates a status change requested by `actor_id`.
    ///
    /// Returns `Ok(None)` when the order is already in `target` (a no-op),
    /// the audit record to persist when the move is allowed, and
    /// `InvalidTransition` otherwise.
    pub fn transition(
        &self,
        target: OrderStatus,
        actor_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<StatusChange>, OrderError> {
        if self.status == target {
            return Ok(None);
        }

        if !self.status.can_transition_to(target) {
            return Err(OrderError::invalid_transition(self.status, target));
        }

        Ok(Some(StatusChange {
            order_id: self.id,
            actor_id,
            from: self.status,
            to: target,
            changed_at: now,
        }))
    }

    /// Applies an accepted status change.
    pub fn apply_status_change(&mut self, change: &StatusChange) {
        self.status = change.to;
        self.updated_at = change.changed_at;
    }
}
