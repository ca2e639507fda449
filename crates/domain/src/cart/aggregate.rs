//! Cart aggregate implementation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{BuyerKey, CartId, Money, Percent, ProductId, UserId, Version};
use serde::{Deserialize, Serialize};

use crate::pricing::{PricedLine, Totals};
use crate::product::Product;

use super::{CartError, ReconciliationPlan};

/// A line in a cart.
///
/// `unit_price` and `discount` are the catalog values seen at the last
/// mutation; they are refreshed from live products every time the cart
/// changes and are only used for the cached totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub discount: Percent,
}

impl CartItem {
    fn priced_from(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id.clone(),
            quantity,
            unit_price: product.price,
            discount: product.discount,
        }
    }
}

impl PricedLine for CartItem {
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

/// Persisted fields of a cart, used by stores to rebuild the aggregate.
#[derive(Debug, Clone)]
pub struct CartParts {
    pub id: CartId,
    pub buyer_key: BuyerKey,
    pub user_id: Option<UserId>,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: Version,
}

/// Cart aggregate root.
///
/// Holds the line items of one buyer and keeps `subtotal`/`total` in step
/// with them: every mutation recomputes both before returning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    id: CartId,
    buyer_key: BuyerKey,
    user_id: Option<UserId>,
    /// Lines in insertion order.
    items: Vec<CartItem>,
    totals: Totals,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Current version for optimistic concurrency.
    #[serde(default)]
    version: Version,
}

// Construction
impl Cart {
    /// Creates an empty, not yet persisted cart for a buyer.
    pub fn new(buyer_key: BuyerKey, user_id: Option<UserId>, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::new(),
            buyer_key,
            user_id,
            items: Vec::new(),
            totals: Totals::default(),
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        }
    }

    /// Rebuilds a cart from its persisted fields, recomputing the totals.
    pub fn rehydrate(parts: CartParts) -> Self {
        let mut cart = Self {
            id: parts.id,
            buyer_key: parts.buyer_key,
            user_id: parts.user_id,
            items: parts.items,
            totals: Totals::default(),
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            version: parts.version,
        };
        cart.recalculate();
        cart
    }
}

// Query methods
impl Cart {
    pub fn id(&self) -> CartId {
        self.id
    }

    pub fn buyer_key(&self) -> &BuyerKey {
        &self.buyer_key
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// Returns the lines in insertion order.
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Returns the line for a product, if present.
    pub fn get_item(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.product_id == product_id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the total number of units across all lines.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    pub fn subtotal(&self) -> Money {
        self.totals.subtotal
    }

    pub fn total(&self) -> Money {
        self.totals.total
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn product_ids(&self) -> Vec<ProductId> {
        self.items.iter().map(|item| item.product_id.clone()).collect()
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

    /// Sets the version after the store accepted a write.
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

// Mutations
impl Cart {
    /// Adds units of a product, summing with an existing line.
    ///
    /// The cumulative quantity is checked against the stock of `product`,
    /// which the caller must have read at call time.
    pub fn add_item(
        &mut self,
        product: &Product,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }

        let existing = self.get_item(&product.id).map_or(0, |item| item.quantity);
        let requested = existing.saturating_add(quantity);
        Self::check_stock(product, requested)?;

        match self.position(&product.id) {
            Some(index) => self.items[index] = CartItem::priced_from(product, requested),
            None => self.items.push(CartItem::priced_from(product, requested)),
        }

        self.touch(now);
        Ok(())
    }

    /// Replaces the quantity of an existing line. A quantity of 0 removes it.
    pub fn set_quantity(
        &mut self,
        product: &Product,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        let index = self
            .position(&product.id)
            .ok_or_else(|| CartError::ItemNotFound {
                product_id: product.id.clone(),
            })?;

        if quantity == 0 {
            self.items.remove(index);
        } else {
            Self::check_stock(product, quantity)?;
            self.items[index] = CartItem::priced_from(product, quantity);
        }

        self.touch(now);
        Ok(())
    }

    /// Removes a product's line. Returns false if it was not in the cart.
    pub fn remove_item(&mut self, product_id: &ProductId, now: DateTime<Utc>) -> bool {
        let Some(index) = self.position(product_id) else {
            return false;
        };
        self.items.remove(index);
        self.touch(now);
        true
    }

    /// Removes every line.
    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.items.clear();
        self.touch(now);
    }

    /// Refreshes line pricing from live catalog entries.
    ///
    /// Lines whose product is absent from `products` keep their last-seen
    /// pricing; reconciliation removes them at checkout.
    pub fn refresh_pricing(&mut self, products: &HashMap<ProductId, Product>) {
        for item in &mut self.items {
            if let Some(product) = products.get(&item.product_id) {
                item.unit_price = product.price;
                item.discount = product.discount;
            }
        }
        self.recalculate();
    }

    /// Merges another cart into this one.
    ///
    /// Quantities of products present in both carts are summed; lines only
    /// in `other` are appended in their original order. The caller discards
    /// `other` afterwards.
    pub fn absorb(&mut self, other: &Cart, now: DateTime<Utc>) {
        for incoming in &other.items {
            match self.position(&incoming.product_id) {
                Some(index) => {
                    let line = &mut self.items[index];
                    line.quantity = line.quantity.saturating_add(incoming.quantity);
                }
                None => self.items.push(incoming.clone()),
            }
        }
        self.touch(now);
    }

    /// Links the cart to a user under the given buyer key.
    pub fn assign_owner(&mut self, user_id: UserId, buyer_key: BuyerKey, now: DateTime<Utc>) {
        self.user_id = Some(user_id);
        self.buyer_key = buyer_key;
        self.updated_at = now;
    }

    /// Applies a reconciliation plan: drops removed lines and clamps the rest.
    pub fn apply_reconciliation(&mut self, plan: &ReconciliationPlan, now: DateTime<Utc>) {
        if plan.is_empty() {
            return;
        }

        self.items
            .retain(|item| !plan.removed().contains(&item.product_id));
        for clamp in plan.clamped() {
            if let Some(index) = self.position(&clamp.product_id) {
                self.items[index].quantity = clamp.available;
            }
        }

        self.touch(now);
    }

    fn check_stock(product: &Product, requested: u32) -> Result<(), CartError> {
        let available = product.sellable_stock();
        if requested > available {
            return Err(CartError::InsufficientStock {
                product_id: product.id.clone(),
                requested,
                available,
            });
        }
        Ok(())
    }

    fn position(&self, product_id: &ProductId) -> Option<usize> {
        self.items
            .iter()
            .position(|item| &item.product_id == product_id)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.recalculate();
        self.updated_at = now;
    }

    fn recalculate(&mut self) {
        self.totals = Totals::of(&self.items);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> Product {
        Product::new("SKU-001", "Widget", Money::from_cents(1000))
            .with_stock(10)
            .with_discount(Percent::new(10).unwrap())
    }

    fn gadget() -> Product {
        Product::new("SKU-002", "Gadget", Money::from_cents(500)).with_stock(3)
    }

    fn empty_cart() -> Cart {
        Cart::new(BuyerKey::new("buyer-1"), None, Utc::now())
    }

    fn assert_totals_match_lines(cart: &Cart) {
        let subtotal: i64 = cart
            .items()
            .iter()
            .map(|i| i.unit_price.cents() * i64::from(i.quantity))
            .sum();
        let hundredths: i128 = cart
            .items()
            .iter()
            .map(|i| {
                i128::from(i.unit_price.cents())
                    * i128::from(i.quantity)
                    * i128::from(i.discount.remaining())
            })
            .sum();
        assert_eq!(cart.subtotal().cents(), subtotal);
        assert_eq!(cart.total(), Money::from_hundredths_of_cent(hundredths));
    }

    #[test]
    fn test_new_cart_is_empty() {
        let cart = empty_cart();
        assert!(cart.is_empty());
        assert!(cart.subtotal().is_zero());
        assert_eq!(cart.version(), Version::initial());
    }

    #[test]
    fn test_add_item_recomputes_totals() {
        let mut cart = empty_cart();
        cart.add_item(&widget(), 2, Utc::now()).unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.subtotal().cents(), 2000);
        assert_eq!(cart.total().cents(), 1800);
    }

    #[test]
    fn test_add_same_item_sums_quantity() {
        let mut cart = empty_cart();
        cart.add_item(&widget(), 2, Utc::now()).unwrap();
        cart.add_item(&widget(), 3, Utc::now()).unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.get_item(&"SKU-001".into()).unwrap().quantity, 5);
    }

    #[test]
    fn test_add_item_checks_cumulative_stock() {
        let mut cart = empty_cart();
        cart.add_item(&gadget(), 2, Utc::now()).unwrap();

        let result = cart.add_item(&gadget(), 2, Utc::now());
        assert_eq!(
            result,
            Err(CartError::InsufficientStock {
                product_id: "SKU-002".into(),
                requested: 4,
                available: 3,
            })
        );
        assert_eq!(cart.get_item(&"SKU-002".into()).unwrap().quantity, 2);
    }

    #[test]
    fn test_add_zero_quantity_fails() {
        let mut cart = empty_cart();
        let result = cart.add_item(&widget(), 0, Utc::now());
        assert!(matches!(result, Err(CartError::InvalidQuantity { .. })));
    }

    #[test]
    fn test_add_unavailable_product_fails() {
        let mut cart = empty_cart();
        let mut product = widget();
        product.available = false;

        let result = cart.add_item(&product, 1, Utc::now());
        assert!(matches!(result, Err(CartError::InsufficientStock { .. })));
    }

    #[test]
    fn test_set_quantity_replaces() {
        let mut cart = empty_cart();
        cart.add_item(&widget(), 2, Utc::now()).unwrap();
        cart.set_quantity(&widget(), 7, Utc::now()).unwrap();

        assert_eq!(cart.get_item(&"SKU-001".into()).unwrap().quantity, 7);
        assert_eq!(cart.subtotal().cents(), 7000);
    }

    #[test]
    fn test_set_quantity_of_missing_item_fails() {
        let mut cart = empty_cart();
        let result = cart.set_quantity(&widget(), 1, Utc::now());
        assert!(matches!(result, Err(CartError::ItemNotFound { .. })));
    }

    #[test]
    fn test_set_quantity_to_zero_removes_line() {
        let mut cart = empty_cart();
        cart.add_item(&widget(), 2, Utc::now()).unwrap();
        cart.set_quantity(&widget(), 0, Utc::now()).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_set_quantity_checks_stock() {
        let mut cart = empty_cart();
        cart.add_item(&gadget(), 1, Utc::now()).unwrap();
        let result = cart.set_quantity(&gadget(), 4, Utc::now());
        assert!(matches!(result, Err(CartError::InsufficientStock { .. })));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cart = empty_cart();
        cart.add_item(&widget(), 1, Utc::now()).unwrap();
        cart.add_item(&gadget(), 1, Utc::now()).unwrap();

        assert!(cart.remove_item(&"SKU-001".into(), Utc::now()));
        assert!(!cart.remove_item(&"SKU-001".into(), Utc::now()));
        assert_eq!(cart.subtotal().cents(), 500);

        cart.clear(Utc::now());
        assert!(cart.is_empty());
        assert!(cart.total().is_zero());
    }

    #[test]
    fn test_totals_track_any_mutation_sequence() {
        let mut cart = empty_cart();
        let now = Utc::now();
        cart.add_item(&widget(), 3, now).unwrap();
        assert_totals_match_lines(&cart);
        cart.add_item(&gadget(), 2, now).unwrap();
        assert_totals_match_lines(&cart);
        cart.set_quantity(&widget(), 1, now).unwrap();
        assert_totals_match_lines(&cart);
        cart.remove_item(&"SKU-002".into(), now);
        assert_totals_match_lines(&cart);
        cart.add_item(&gadget(), 3, now).unwrap();
        assert_totals_match_lines(&cart);
    }

    #[test]
    fn test_refresh_pricing_uses_live_catalog() {
        let mut cart = empty_cart();
        cart.add_item(&widget(), 2, Utc::now()).unwrap();

        let mut repriced = widget();
        repriced.price = Money::from_cents(1500);
        repriced.discount = Percent::zero();
        let catalog = HashMap::from([(repriced.id.clone(), repriced)]);
        cart.refresh_pricing(&catalog);

        assert_eq!(cart.subtotal().cents(), 3000);
        assert_eq!(cart.total().cents(), 3000);
    }

    #[test]
    fn test_absorb_sums_shared_and_appends_rest() {
        let now = Utc::now();
        let mut user_cart = Cart::new(BuyerKey::new("device-a"), Some(UserId::new()), now);
        user_cart.add_item(&widget(), 1, now).unwrap();

        let mut anonymous = Cart::new(BuyerKey::new("device-b"), None, now);
        anonymous.add_item(&widget(), 2, now).unwrap();
        anonymous.add_item(&gadget(), 1, now).unwrap();

        user_cart.absorb(&anonymous, now);

        assert_eq!(user_cart.items().len(), 2);
        assert_eq!(user_cart.get_item(&"SKU-001".into()).unwrap().quantity, 3);
        assert_eq!(user_cart.get_item(&"SKU-002".into()).unwrap().quantity, 1);
        assert_eq!(user_cart.items()[1].product_id.as_str(), "SKU-002");
        assert_totals_match_lines(&user_cart);
    }

    #[test]
    fn test_rehydrate_recomputes_totals() {
        let mut cart = empty_cart();
        cart.add_item(&widget(), 2, Utc::now()).unwrap();

        let restored = Cart::rehydrate(CartParts {
            id: cart.id(),
            buyer_key: cart.buyer_key().clone(),
            user_id: None,
            items: cart.items().to_vec(),
            created_at: cart.created_at(),
            updated_at: cart.updated_at(),
            version: Version::new(4),
        });

        assert_eq!(restored.total(), cart.total());
        assert_eq!(restored.version(), Version::new(4));
    }
}
