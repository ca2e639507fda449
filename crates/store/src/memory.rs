use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BuyerKey, CartId, OrderId, ProductId, UserId, Version};
use domain::{Account, Cart, Order, OrderCode, Product, StatusChange};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{AccountStore, CartStore, CheckoutCommit, InventoryStore, OrderStore, ReminderStore},
};

/// Step of a checkout commit after which an injected failure fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutFailPoint {
    /// After the order rows were written, before any stock moved.
    OrderPersisted,
    /// After every stock decrement, before the cart is deleted.
    StockDecremented,
}

#[derive(Debug, Clone, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    carts: HashMap<CartId, Cart>,
    orders: HashMap<OrderId, Order>,
    status_changes: Vec<StatusChange>,
    accounts: HashMap<UserId, Account>,
    /// Cart `updated_at` covered by the last reminder, and when it was sent.
    reminders: HashMap<CartId, (DateTime<Utc>, DateTime<Utc>)>,
}

#[derive(Debug, Default)]
struct Faults {
    checkout: Option<CheckoutFailPoint>,
    failing_reads: u32,
    failing_account_deletes: HashSet<UserId>,
}

/// In-memory store implementation for testing.
///
/// Provides the same interface and the same atomicity as the PostgreSQL
/// store: multi-record writes are applied to a copy of the state that only
/// replaces the live state once every step succeeded.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    faults: Arc<Mutex<Faults>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next checkout commit fail at the given step.
    pub fn fail_next_checkout_at(&self, point: CheckoutFailPoint) {
        self.faults().checkout = Some(point);
    }

    /// Makes the next `count` scan reads fail with a backend error.
    pub fn fail_next_reads(&self, count: u32) {
        self.faults().failing_reads = count;
    }

    /// Makes every delete of this account fail with a backend error.
    pub fn fail_account_delete(&self, user_id: UserId) {
        self.faults().failing_account_deletes.insert(user_id);
    }

    /// Returns the number of stored carts.
    pub async fn cart_count(&self) -> usize {
        self.state.read().await.carts.len()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_checkout_fault(&self) -> Option<CheckoutFailPoint> {
        self.faults().checkout.take()
    }

    fn scan_fault(&self) -> Result<()> {
        let mut faults = self.faults();
        if faults.failing_reads > 0 {
            faults.failing_reads -= 1;
            return Err(StoreError::Backend("injected read failure".to_string()));
        }
        Ok(())
    }
}

impl State {
    fn cart_with(&self, pred: impl Fn(&Cart) -> bool) -> Option<&Cart> {
        self.carts.values().find(|cart| pred(cart))
    }

    fn save_cart(&mut self, cart: &Cart) -> Result<Version> {
        let expected = cart.version();
        let actual = self
            .carts
            .get(&cart.id())
            .map_or(Version::initial(), Cart::version);
        if actual != expected {
            return Err(StoreError::conflict("cart", cart.id(), expected, actual));
        }

        if self
            .cart_with(|other| other.id() != cart.id() && other.buyer_key() == cart.buyer_key())
            .is_some()
        {
            return Err(StoreError::UniqueViolation {
                entity: "cart",
                field: "buyer_key",
                value: cart.buyer_key().to_string(),
            });
        }
        if let Some(user_id) = cart.user_id()
            && self
                .cart_with(|other| other.id() != cart.id() && other.user_id() == Some(user_id))
                .is_some()
        {
            return Err(StoreError::UniqueViolation {
                entity: "cart",
                field: "user_id",
                value: user_id.to_string(),
            });
        }

        let version = expected.next();
        let mut stored = cart.clone();
        stored.set_version(version);
        self.carts.insert(cart.id(), stored);
        Ok(version)
    }

    fn delete_cart(&mut self, cart_id: CartId, expected: Version) -> Result<()> {
        let actual = self
            .carts
            .get(&cart_id)
            .map_or(Version::initial(), Cart::version);
        if actual != expected || actual == Version::initial() {
            return Err(StoreError::conflict("cart", cart_id, expected, actual));
        }
        self.carts.remove(&cart_id);
        self.reminders.remove(&cart_id);
        Ok(())
    }

    fn decrement_stock(&mut self, product_id: &ProductId, quantity: u32) -> Result<u32> {
        let product = self
            .products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::not_found("product", product_id))?;

        let available = product.sellable_stock();
        if available < quantity {
            return Err(StoreError::InsufficientStock {
                product_id: product_id.clone(),
                requested: quantity,
                available,
            });
        }
        product.stock -= quantity;
        Ok(product.stock)
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(product_id).cloned())
    }

    async fn get_products(&self, product_ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let state = self.state.read().await;
        Ok(product_ids
            .iter()
            .filter_map(|id| state.products.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        product.validate()?;
        let mut state = self.state.write().await;
        state.products.insert(product.id.clone(), product);
        Ok(())
    }

    async fn decrement_stock(&self, product_id: &ProductId, quantity: u32) -> Result<u32> {
        self.state.write().await.decrement_stock(product_id, quantity)
    }

    async fn increment_stock(&self, product_id: &ProductId, quantity: u32) -> Result<u32> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::not_found("product", product_id))?;
        product.stock = product.stock.saturating_add(quantity);
        Ok(product.stock)
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&cart_id).cloned())
    }

    async fn get_cart_by_buyer_key(&self, buyer_key: &BuyerKey) -> Result<Option<Cart>> {
        let state = self.state.read().await;
        Ok(state.cart_with(|cart| cart.buyer_key() == buyer_key).cloned())
    }

    async fn get_cart_by_user(&self, user_id: UserId) -> Result<Option<Cart>> {
        let state = self.state.read().await;
        Ok(state
            .cart_with(|cart| cart.user_id() == Some(user_id))
            .cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<Version> {
        self.state.write().await.save_cart(cart)
    }

    async fn delete_cart(&self, cart_id: CartId, expected: Version) -> Result<()> {
        self.state.write().await.delete_cart(cart_id, expected)
    }

    async fn merge_carts(&self, survivor: &Cart, discarded: &Cart) -> Result<Version> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();

        next.delete_cart(discarded.id(), discarded.version())?;
        let version = next.save_cart(survivor)?;

        *guard = next;
        Ok(version)
    }

    async fn find_abandoned_carts(&self, updated_before: DateTime<Utc>) -> Result<Vec<Cart>> {
        self.scan_fault()?;
        let state = self.state.read().await;
        let mut carts: Vec<_> = state
            .carts
            .values()
            .filter(|cart| !cart.is_empty() && cart.updated_at() < updated_before)
            .cloned()
            .collect();
        carts.sort_by_key(Cart::updated_at);
        Ok(carts)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn commit_checkout(&self, commit: CheckoutCommit) -> Result<Order> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let fault = self.take_checkout_fault();

        let actual = next
            .carts
            .get(&commit.cart_id)
            .map_or(Version::initial(), Cart::version);
        if actual != commit.cart_version || actual == Version::initial() {
            return Err(StoreError::conflict(
                "cart",
                commit.cart_id,
                commit.cart_version,
                actual,
            ));
        }

        let code = commit.order.code();
        if next.orders.values().any(|order| order.code() == code) {
            return Err(StoreError::UniqueViolation {
                entity: "order",
                field: "code",
                value: code.to_string(),
            });
        }
        let mut order = commit.order.clone();
        order.set_version(Version::first());
        next.orders.insert(order.id(), order.clone());

        if fault == Some(CheckoutFailPoint::OrderPersisted) {
            return Err(StoreError::Backend(
                "injected failure after order insert".to_string(),
            ));
        }

        for (product_id, quantity) in commit.decrements() {
            next.decrement_stock(product_id, quantity)
                .map_err(|err| match err {
                    StoreError::NotFound { .. } => StoreError::InsufficientStock {
                        product_id: product_id.clone(),
                        requested: quantity,
                        available: 0,
                    },
                    other => other,
                })?;
        }

        if fault == Some(CheckoutFailPoint::StockDecremented) {
            return Err(StoreError::Backend(
                "injected failure after stock decrement".to_string(),
            ));
        }

        next.delete_cart(commit.cart_id, commit.cart_version)?;

        *guard = next;
        Ok(order)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn get_order_by_code(&self, code: &OrderCode) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|order| order.code() == code)
            .cloned())
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|order| order.user_id() == user_id)
            .cloned()
            .collect();
        orders.sort_by_key(|order| std::cmp::Reverse(order.created_at()));
        Ok(orders)
    }

    async fn record_status_change(
        &self,
        change: &StatusChange,
        expected: Version,
    ) -> Result<Version> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&change.order_id)
            .ok_or_else(|| StoreError::not_found("order", change.order_id))?;

        if order.version() != expected {
            return Err(StoreError::conflict(
                "order",
                change.order_id,
                expected,
                order.version(),
            ));
        }

        let version = expected.next();
        order.apply_status_change(change);
        order.set_version(version);
        state.status_changes.push(change.clone());
        Ok(version)
    }

    async fn status_history(&self, order_id: OrderId) -> Result<Vec<StatusChange>> {
        let state = self.state.read().await;
        Ok(state
            .status_changes
            .iter()
            .filter(|change| change.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn insert_account(&self, account: Account) -> Result<()> {
        let mut state = self.state.write().await;
        if state.accounts.values().any(|a| a.email == account.email) {
            return Err(StoreError::UniqueViolation {
                entity: "account",
                field: "email",
                value: account.email,
            });
        }
        state.accounts.insert(account.id, account);
        Ok(())
    }

    async fn get_account(&self, user_id: UserId) -> Result<Option<Account>> {
        Ok(self.state.read().await.accounts.get(&user_id).cloned())
    }

    async fn confirm_email(&self, user_id: UserId) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.accounts.get_mut(&user_id) {
            Some(account) => {
                account.email_confirmed = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_unconfirmed_accounts(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Account>> {
        self.scan_fault()?;
        let state = self.state.read().await;
        let mut accounts: Vec<_> = state
            .accounts
            .values()
            .filter(|a| !a.email_confirmed && a.created_at < created_before)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    async fn delete_unconfirmed_account(
        &self,
        user_id: UserId,
        created_before: DateTime<Utc>,
    ) -> Result<bool> {
        if self.faults().failing_account_deletes.contains(&user_id) {
            return Err(StoreError::Backend(format!(
                "injected delete failure for account {user_id}"
            )));
        }

        let mut state = self.state.write().await;
        let expired = state
            .accounts
            .get(&user_id)
            .is_some_and(|a| !a.email_confirmed && a.created_at < created_before);
        if expired {
            state.accounts.remove(&user_id);
        }
        Ok(expired)
    }
}

#[async_trait]
impl ReminderStore for InMemoryStore {
    async fn last_reminder(&self, cart_id: CartId) -> Result<Option<DateTime<Utc>>> {
        let state = self.state.read().await;
        Ok(state
            .reminders
            .get(&cart_id)
            .map(|(cart_updated_at, _)| *cart_updated_at))
    }

    async fn record_reminder(
        &self,
        cart_id: CartId,
        cart_updated_at: DateTime<Utc>,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.carts.contains_key(&cart_id) {
            return Err(StoreError::not_found("cart", cart_id));
        }
        state.reminders.insert(cart_id, (cart_updated_at, sent_at));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::Money;
    use domain::OrderItem;

    fn widget(stock: u32) -> Product {
        Product::new("SKU-001", "Widget", Money::from_cents(1000)).with_stock(stock)
    }

    async fn saved_cart(store: &InMemoryStore, product: &Product, quantity: u32) -> Cart {
        let mut cart = Cart::new(BuyerKey::generate(), None, Utc::now());
        cart.add_item(product, quantity, Utc::now()).unwrap();
        let version = store.save_cart(&cart).await.unwrap();
        cart.set_version(version);
        cart
    }

    fn commit_for(cart: &Cart, product: &Product) -> CheckoutCommit {
        let order = Order::place(
            OrderId::new(),
            OrderCode::generate(),
            UserId::new(),
            cart.items()
                .iter()
                .map(|item| OrderItem::snapshot(product, item.quantity))
                .collect(),
            Utc::now(),
        )
        .unwrap();
        CheckoutCommit {
            order,
            cart_id: cart.id(),
            cart_version: cart.version(),
        }
    }

    #[tokio::test]
    async fn increment_stock_restocks_and_saturates() {
        let store = InMemoryStore::new();
        store.upsert_product(widget(5)).await.unwrap();
        let id = ProductId::new("SKU-001");

        assert_eq!(store.increment_stock(&id, 3).await.unwrap(), 8);
        assert_eq!(store.get_product(&id).await.unwrap().unwrap().stock, 8);
        assert_eq!(store.increment_stock(&id, u32::MAX).await.unwrap(), u32::MAX);

        let missing = store.increment_stock(&ProductId::new("SKU-404"), 1).await;
        assert!(matches!(missing, Err(StoreError::NotFound { entity: "product", .. })));
    }

    #[tokio::test]
    async fn save_cart_assigns_versions() {
        let store = InMemoryStore::new();
        let mut cart = Cart::new(BuyerKey::generate(), None, Utc::now());

        let v1 = store.save_cart(&cart).await.unwrap();
        assert_eq!(v1, Version::first());

        cart.set_version(v1);
        let v2 = store.save_cart(&cart).await.unwrap();
        assert_eq!(v2, Version::new(2));
    }

    #[tokio::test]
    async fn stale_cart_save_conflicts() {
        let store = InMemoryStore::new();
        let product = widget(10);
        let cart = saved_cart(&store, &product, 1).await;

        let mut first = cart.clone();
        first.add_item(&product, 1, Utc::now()).unwrap();
        store.save_cart(&first).await.unwrap();

        let mut second = cart;
        second.add_item(&product, 2, Utc::now()).unwrap();
        let result = store.save_cart(&second).await;

        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn buyer_key_is_unique() {
        let store = InMemoryStore::new();
        let key = BuyerKey::generate();
        store
            .save_cart(&Cart::new(key.clone(), None, Utc::now()))
            .await
            .unwrap();

        let result = store.save_cart(&Cart::new(key, None, Utc::now())).await;
        assert!(matches!(
            result,
            Err(StoreError::UniqueViolation {
                field: "buyer_key",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn decrement_is_conditional() {
        let store = InMemoryStore::new();
        store.upsert_product(widget(3)).await.unwrap();
        let id = ProductId::new("SKU-001");

        assert_eq!(store.decrement_stock(&id, 2).await.unwrap(), 1);
        let result = store.decrement_stock(&id, 2).await;
        assert!(matches!(
            result,
            Err(StoreError::InsufficientStock { available: 1, .. })
        ));
        assert_eq!(store.get_product(&id).await.unwrap().unwrap().stock, 1);
    }

    #[tokio::test]
    async fn upsert_rejects_non_positive_price() {
        let store = InMemoryStore::new();
        let free = Product::new("SKU-FREE", "Free", Money::zero());
        let result = store.upsert_product(free).await;
        assert!(matches!(result, Err(StoreError::InvalidProduct(_))));
    }

    #[tokio::test]
    async fn checkout_commit_applies_every_step() {
        let store = InMemoryStore::new();
        let product = widget(5);
        store.upsert_product(product.clone()).await.unwrap();
        let cart = saved_cart(&store, &product, 2).await;

        let order = store
            .commit_checkout(commit_for(&cart, &product))
            .await
            .unwrap();

        assert_eq!(order.version(), Version::first());
        assert!(store.get_cart(cart.id()).await.unwrap().is_none());
        assert!(store.get_order(order.id()).await.unwrap().is_some());
        let stock = store.get_product(&product.id).await.unwrap().unwrap().stock;
        assert_eq!(stock, 3);
    }

    #[tokio::test]
    async fn checkout_fault_leaves_no_partial_state() {
        for point in [
            CheckoutFailPoint::OrderPersisted,
            CheckoutFailPoint::StockDecremented,
        ] {
            let store = InMemoryStore::new();
            let product = widget(5);
            store.upsert_product(product.clone()).await.unwrap();
            let cart = saved_cart(&store, &product, 2).await;

            store.fail_next_checkout_at(point);
            let result = store.commit_checkout(commit_for(&cart, &product)).await;

            assert!(matches!(result, Err(StoreError::Backend(_))));
            assert_eq!(store.order_count().await, 0);
            assert!(store.get_cart(cart.id()).await.unwrap().is_some());
            let stock = store.get_product(&product.id).await.unwrap().unwrap().stock;
            assert_eq!(stock, 5);
        }
    }

    #[tokio::test]
    async fn checkout_of_changed_cart_conflicts() {
        let store = InMemoryStore::new();
        let product = widget(5);
        store.upsert_product(product.clone()).await.unwrap();
        let cart = saved_cart(&store, &product, 2).await;
        let commit = commit_for(&cart, &product);

        let mut changed = cart.clone();
        changed.add_item(&product, 1, Utc::now()).unwrap();
        store.save_cart(&changed).await.unwrap();

        let result = store.commit_checkout(commit).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { .. })
        ));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn merge_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let product = widget(10);
        let anonymous = saved_cart(&store, &product, 1).await;
        let user_cart = saved_cart(&store, &product, 2).await;

        // Stale survivor: merge must fail and keep both carts.
        let mut stale = user_cart.clone();
        stale.set_version(Version::new(7));
        let result = store.merge_carts(&stale, &anonymous).await;
        assert!(result.is_err());
        assert_eq!(store.cart_count().await, 2);

        let mut survivor = user_cart.clone();
        survivor.absorb(&anonymous, Utc::now());
        survivor.assign_owner(UserId::new(), anonymous.buyer_key().clone(), Utc::now());
        store.merge_carts(&survivor, &anonymous).await.unwrap();

        assert_eq!(store.cart_count().await, 1);
        let stored = store
            .get_cart_by_buyer_key(anonymous.buyer_key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id(), user_cart.id());
        assert_eq!(stored.total_quantity(), 3);
    }

    #[tokio::test]
    async fn status_change_is_versioned_and_audited() {
        let store = InMemoryStore::new();
        let product = widget(5);
        store.upsert_product(product.clone()).await.unwrap();
        let cart = saved_cart(&store, &product, 1).await;
        let order = store
            .commit_checkout(commit_for(&cart, &product))
            .await
            .unwrap();

        let change = order
            .transition(domain::OrderStatus::Processing, UserId::new(), Utc::now())
            .unwrap()
            .unwrap();
        let version = store
            .record_status_change(&change, order.version())
            .await
            .unwrap();
        assert_eq!(version, Version::new(2));

        let stale = store.record_status_change(&change, order.version()).await;
        assert!(matches!(
            stale,
            Err(StoreError::ConcurrencyConflict { .. })
        ));
        assert_eq!(store.status_history(order.id()).await.unwrap(), vec![change]);
    }

    #[tokio::test]
    async fn unconfirmed_delete_is_conditional() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let account = Account::register("late@example.com", "Late", now - Duration::hours(30));
        let id = account.id;
        store.insert_account(account).await.unwrap();

        // Confirmed between scan and delete: must survive.
        store.confirm_email(id).await.unwrap();
        let deleted = store
            .delete_unconfirmed_account(id, now - Duration::hours(24))
            .await
            .unwrap();
        assert!(!deleted);
        assert!(store.get_account(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn injected_read_failures_are_consumed() {
        let store = InMemoryStore::new();
        store.fail_next_reads(1);

        assert!(store.find_abandoned_carts(Utc::now()).await.is_err());
        assert!(store.find_abandoned_carts(Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn deleting_a_cart_drops_its_reminder() {
        let store = InMemoryStore::new();
        let product = widget(5);
        let cart = saved_cart(&store, &product, 1).await;

        store
            .record_reminder(cart.id(), cart.updated_at(), Utc::now())
            .await
            .unwrap();
        store.delete_cart(cart.id(), cart.version()).await.unwrap();

        assert!(store.last_reminder(cart.id()).await.unwrap().is_none());
    }
}
