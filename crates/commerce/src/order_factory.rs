//! Order creation: turns a reconciled cart into an order in one commit.

use std::sync::Arc;
use std::time::Instant;

use common::{BuyerKey, Clock, OrderId, SystemClock, UserId};
use domain::{Cart, Order, OrderCode, OrderItem};
use store::{CheckoutCommit, Store, StoreError};
use tokio_util::sync::CancellationToken;

use crate::error::{CommerceError, Result};

/// Tuning for order creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutPolicy {
    /// Attempts before a colliding order code is reported as an error.
    pub max_code_attempts: u32,
}

impl Default for CheckoutPolicy {
    fn default() -> Self {
        Self {
            max_code_attempts: 3,
        }
    }
}

type CodeGenerator = Arc<dyn Fn() -> OrderCode + Send + Sync>;

/// An order ready to be committed, with the cart it was built from.
struct PreparedOrder {
    order: Order,
    cart: Cart,
}

/// Creates orders from carts.
///
/// Validation happens twice: once here against a fresh stock read, to give
/// the caller a precise error early, and again inside the store transaction
/// through the conditional stock decrement, which is what actually protects
/// against overselling.
pub struct OrderFactory<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
    policy: CheckoutPolicy,
    codes: CodeGenerator,
}

impl<S: Store> OrderFactory<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            policy: CheckoutPolicy::default(),
            codes: Arc::new(OrderCode::generate),
        }
    }

    pub fn with_policy(mut self, policy: CheckoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the order code source.
    pub fn with_code_generator(
        mut self,
        codes: impl Fn() -> OrderCode + Send + Sync + 'static,
    ) -> Self {
        self.codes = Arc::new(codes);
        self
    }

    /// Converts the buyer's cart into a `Pending` order.
    ///
    /// Persisting the order, decrementing stock for every line and deleting
    /// the cart happen in a single store transaction: either all of it is
    /// visible afterwards or none of it is.
    #[tracing::instrument(skip(self))]
    pub async fn create_order(&self, buyer_key: &BuyerKey, user_id: UserId) -> Result<Order> {
        self.create_order_with_cancel(buyer_key, user_id, &CancellationToken::new())
            .await
    }

    /// Like [`create_order`](Self::create_order), but gives up with
    /// `Cancelled` if `cancel` fires before the commit starts.
    ///
    /// Once the commit has started it always runs to completion.
    pub async fn create_order_with_cancel(
        &self,
        buyer_key: &BuyerKey,
        user_id: UserId,
        cancel: &CancellationToken,
    ) -> Result<Order> {
        metrics::counter!("checkout_total").increment(1);
        let start = Instant::now();

        let result = self.run(buyer_key, user_id, cancel).await;

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        if let Err(ref e) = result {
            metrics::counter!("checkout_failures_total", "reason" => e.kind()).increment(1);
            tracing::warn!(error = %e, "Checkout failed");
        }
        result
    }

    async fn run(
        &self,
        buyer_key: &BuyerKey,
        user_id: UserId,
        cancel: &CancellationToken,
    ) -> Result<Order> {
        let prepared = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CommerceError::Cancelled),
            prepared = self.prepare(buyer_key, user_id) => prepared?,
        };

        if cancel.is_cancelled() {
            return Err(CommerceError::Cancelled);
        }

        self.commit(prepared).await
    }

    async fn prepare(&self, buyer_key: &BuyerKey, user_id: UserId) -> Result<PreparedOrder> {
        let cart = load_buyer_cart(&self.store, buyer_key, user_id).await?;
        if cart.is_empty() {
            return Err(CommerceError::EmptyCart);
        }

        let catalog = self.store.get_products(&cart.product_ids()).await?;
        let mut items = Vec::with_capacity(cart.items().len());
        for line in cart.items() {
            let product = catalog.get(&line.product_id);
            let available = product.map_or(0, |p| p.sellable_stock());
            match product {
                Some(product) if available >= line.quantity => {
                    items.push(OrderItem::snapshot(product, line.quantity));
                }
                _ => {
                    return Err(CommerceError::InsufficientStock {
                        product_id: line.product_id.clone(),
                        requested: line.quantity,
                        available,
                    });
                }
            }
        }

        let order = Order::place(
            OrderId::new(),
            (self.codes)(),
            user_id,
            items,
            self.clock.now(),
        )?;

        Ok(PreparedOrder { order, cart })
    }

    async fn commit(&self, prepared: PreparedOrder) -> Result<Order> {
        let PreparedOrder { mut order, cart } = prepared;

        let mut attempt = 1;
        loop {
            let commit = CheckoutCommit {
                order: order.clone(),
                cart_id: cart.id(),
                cart_version: cart.version(),
            };

            match self.store.commit_checkout(commit).await {
                Ok(order) => {
                    tracing::info!(
                        order_id = %order.id(),
                        code = %order.code(),
                        cart_id = %cart.id(),
                        total = %order.total(),
                        "Order created"
                    );
                    return Ok(order);
                }
                Err(StoreError::UniqueViolation {
                    entity: "order",
                    field: "code",
                    ..
                }) if attempt < self.policy.max_code_attempts => {
                    attempt += 1;
                    tracing::debug!(attempt, "Order code collision, drawing a new code");
                    order = order.with_code((self.codes)());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Loads the cart a buyer checks out.
///
/// The cart under `buyer_key` comes first. When the key has no cart, as on
/// a second device of a signed-in user, the user's own cart is used. A
/// missing cart is an empty cart. A cart linked to a different user is
/// reported as not found rather than exposing its existence.
pub(crate) async fn load_buyer_cart<S: Store>(
    store: &S,
    buyer_key: &BuyerKey,
    user_id: UserId,
) -> Result<Cart> {
    let cart = match store.get_cart_by_buyer_key(buyer_key).await? {
        Some(cart) => cart,
        None => store
            .get_cart_by_user(user_id)
            .await?
            .ok_or(CommerceError::EmptyCart)?,
    };

    match cart.user_id() {
        Some(owner) if owner != user_id => Err(CommerceError::not_found("cart", buyer_key)),
        _ => Ok(cart),
    }
}
