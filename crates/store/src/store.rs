use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BuyerKey, CartId, OrderId, ProductId, UserId, Version};
use domain::{Account, Cart, Order, OrderCode, Product, StatusChange};

use crate::Result;

/// Owner of the product stock counters.
///
/// Stock is only ever changed through the conditional decrement and the
/// increment below; there is no way to write an arbitrary stock value other
/// than a catalog upsert.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Reads a product with its current stock.
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>>;

    /// Reads several products at once. Unknown ids are absent from the map.
    async fn get_products(&self, product_ids: &[ProductId]) -> Result<HashMap<ProductId, Product>>;

    /// Creates or replaces a catalog entry (admin edit).
    async fn upsert_product(&self, product: Product) -> Result<()>;

    /// Removes `quantity` units if at least that many are sellable.
    ///
    /// Check and decrement are one atomic step. Returns the remaining stock,
    /// or `InsufficientStock` without changing anything.
    async fn decrement_stock(&self, product_id: &ProductId, quantity: u32) -> Result<u32>;

    /// Adds `quantity` units. Returns the new stock.
    async fn increment_stock(&self, product_id: &ProductId, quantity: u32) -> Result<u32>;
}

/// Persistence for carts.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>>;

    async fn get_cart_by_buyer_key(&self, buyer_key: &BuyerKey) -> Result<Option<Cart>>;

    async fn get_cart_by_user(&self, user_id: UserId) -> Result<Option<Cart>>;

    /// Persists a cart as one unit and returns its new version.
    ///
    /// A cart at `Version::initial()` is inserted; buyer key and user must
    /// be free (`UniqueViolation` otherwise). Any other cart is updated only
    /// if the stored version still equals `cart.version()`.
    async fn save_cart(&self, cart: &Cart) -> Result<Version>;

    /// Deletes a cart if it is still at `expected`.
    async fn delete_cart(&self, cart_id: CartId, expected: Version) -> Result<()>;

    /// Atomically deletes `discarded` and saves `survivor`.
    ///
    /// Both are version-checked. On any failure neither cart changes, so a
    /// user never ends up with two live carts.
    async fn merge_carts(&self, survivor: &Cart, discarded: &Cart) -> Result<Version>;

    /// Carts with at least one item whose last update is before `updated_before`.
    async fn find_abandoned_carts(&self, updated_before: DateTime<Utc>) -> Result<Vec<Cart>>;
}

/// Everything written when a cart becomes an order.
#[derive(Debug, Clone)]
pub struct CheckoutCommit {
    /// The order to insert; its lines drive the stock decrements.
    pub order: Order,
    /// The source cart, deleted if still at `cart_version`.
    pub cart_id: CartId,
    pub cart_version: Version,
}

impl CheckoutCommit {
    /// Units to take from each product's stock.
    pub fn decrements(&self) -> impl Iterator<Item = (&ProductId, u32)> {
        self.order
            .items()
            .iter()
            .map(|item| (&item.product_id, item.quantity))
    }
}

/// Persistence for orders and their status history.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts the order, decrements stock for every line and deletes the
    /// source cart in one transaction.
    ///
    /// Fails without any effect on `ConcurrencyConflict` (cart changed or
    /// gone), `InsufficientStock` (a conditional decrement failed) or
    /// `UniqueViolation` (order code taken). Returns the stored order.
    async fn commit_checkout(&self, commit: CheckoutCommit) -> Result<Order>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    async fn get_order_by_code(&self, code: &OrderCode) -> Result<Option<Order>>;

    /// Orders of a user, newest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Applies a status change if the order is still at `expected` and
    /// appends the audit record, atomically. Returns the new version.
    async fn record_status_change(
        &self,
        change: &StatusChange,
        expected: Version,
    ) -> Result<Version>;

    /// Audit trail of an order, oldest first.
    async fn status_history(&self, order_id: OrderId) -> Result<Vec<StatusChange>>;
}

/// Persistence for registered accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_account(&self, account: Account) -> Result<()>;

    async fn get_account(&self, user_id: UserId) -> Result<Option<Account>>;

    /// Marks the email as confirmed. Returns false if the account is gone.
    async fn confirm_email(&self, user_id: UserId) -> Result<bool>;

    /// Unconfirmed accounts created before `created_before`.
    async fn find_unconfirmed_accounts(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Account>>;

    /// Deletes the account only if it is still unconfirmed and was created
    /// before `created_before`. Returns whether a row was deleted.
    async fn delete_unconfirmed_account(
        &self,
        user_id: UserId,
        created_before: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Ledger of abandoned-cart reminders already sent.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// The cart `updated_at` covered by the last reminder, if any.
    async fn last_reminder(&self, cart_id: CartId) -> Result<Option<DateTime<Utc>>>;

    /// Records that the cart state as of `cart_updated_at` was reminded.
    async fn record_reminder(
        &self,
        cart_id: CartId,
        cart_updated_at: DateTime<Utc>,
        sent_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// The full persistence surface used by the services.
pub trait Store:
    InventoryStore + CartStore + OrderStore + AccountStore + ReminderStore + Clone + 'static
{
}

// Blanket implementation for any type providing every port
impl<T> Store for T where
    T: InventoryStore + CartStore + OrderStore + AccountStore + ReminderStore + Clone + 'static
{
}
