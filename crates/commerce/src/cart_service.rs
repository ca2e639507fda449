//! Cart service: the only entry point for cart mutations.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{BuyerKey, CartId, Clock, ProductId, SystemClock, UserId};
use domain::{Cart, Product};
use store::{Store, StoreError};

use crate::error::{CommerceError, Result};

/// Tuning for cart writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartPolicy {
    /// How many times a load-mutate-save cycle is replayed after a
    /// version conflict before `Conflict` is returned.
    pub max_conflict_retries: u32,
}

impl Default for CartPolicy {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
        }
    }
}

/// Service for cart operations.
///
/// Every mutation loads the cart, refreshes its pricing from the live
/// catalog, applies the change and saves it with an expected-version check.
pub struct CartService<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
    policy: CartPolicy,
}

impl<S: Store> CartService<S> {
    /// Creates a new cart service using the system clock.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Creates a new cart service with an injected clock.
    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            policy: CartPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CartPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Gets a cart by ID.
    pub async fn get_cart(&self, cart_id: CartId) -> Result<Cart> {
        self.store
            .get_cart(cart_id)
            .await?
            .ok_or_else(|| CommerceError::not_found("cart", cart_id))
    }

    /// Returns the buyer's cart, creating an empty one on first access.
    ///
    /// With a user, an unowned cart under `buyer_key` is associated with
    /// that user (merging into the user's existing cart if there is one).
    #[tracing::instrument(skip(self))]
    pub async fn find_or_create(
        &self,
        buyer_key: &BuyerKey,
        user_id: Option<UserId>,
    ) -> Result<Cart> {
        let Some(user_id) = user_id else {
            if let Some(cart) = self.store.get_cart_by_buyer_key(buyer_key).await? {
                return Ok(cart);
            }
            return self.create(buyer_key.clone(), None).await;
        };

        match self.store.get_cart_by_buyer_key(buyer_key).await? {
            Some(cart) if cart.user_id() == Some(user_id) => return Ok(cart),
            Some(cart) if cart.user_id().is_none() => {
                return self.associate_with_user(buyer_key, user_id).await;
            }
            _ => {}
        }

        if let Some(cart) = self.store.get_cart_by_user(user_id).await? {
            return Ok(cart);
        }

        // The key is taken by another user's cart; the new cart gets its own.
        let key = match self.store.get_cart_by_buyer_key(buyer_key).await? {
            Some(_) => BuyerKey::generate(),
            None => buyer_key.clone(),
        };
        self.create(key, Some(user_id)).await
    }

    /// Adds `quantity` units of a product, summing with an existing line.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Cart> {
        self.modify(cart_id, Some(product_id), |cart, catalog, now| {
            let product = catalog
                .get(product_id)
                .ok_or_else(|| CommerceError::not_found("product", product_id))?;
            cart.add_item(product, quantity, now)?;
            Ok(())
        })
        .await
    }

    /// Sets the absolute quantity of a line. Zero removes it.
    #[tracing::instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Cart> {
        self.modify(cart_id, Some(product_id), |cart, catalog, now| {
            if cart.get_item(product_id).is_none() {
                return Err(CommerceError::not_found("cart item", product_id));
            }
            if quantity == 0 {
                cart.remove_item(product_id, now);
                return Ok(());
            }
            let product = catalog
                .get(product_id)
                .ok_or_else(|| CommerceError::not_found("product", product_id))?;
            cart.set_quantity(product, quantity, now)?;
            Ok(())
        })
        .await
    }

    /// Removes a product's line. Removing an absent product is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, cart_id: CartId, product_id: &ProductId) -> Result<Cart> {
        self.modify(cart_id, None, |cart, _, now| {
            cart.remove_item(product_id, now);
            Ok(())
        })
        .await
    }

    /// Removes every line.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, cart_id: CartId) -> Result<Cart> {
        self.modify(cart_id, None, |cart, _, now| {
            cart.clear(now);
            Ok(())
        })
        .await
    }

    /// Links the cart under `buyer_key` to a user who just signed in.
    ///
    /// If the user already owns a cart, the anonymous cart is merged into
    /// it and discarded in one store operation; the survivor takes over
    /// `buyer_key`. Otherwise the anonymous cart itself becomes the user's.
    #[tracing::instrument(skip(self))]
    pub async fn associate_with_user(&self, buyer_key: &BuyerKey, user_id: UserId) -> Result<Cart> {
        let mut attempt = 0;
        loop {
            match self.try_associate(buyer_key, user_id).await {
                Err(CommerceError::Conflict { .. }) if attempt < self.policy.max_conflict_retries => {
                    attempt += 1;
                    metrics::counter!("cart_conflict_retries_total").increment(1);
                    tracing::debug!(attempt, "Cart association conflicted, retrying");
                }
                result => return result,
            }
        }
    }

    async fn try_associate(&self, buyer_key: &BuyerKey, user_id: UserId) -> Result<Cart> {
        let anonymous = self
            .store
            .get_cart_by_buyer_key(buyer_key)
            .await?
            .ok_or_else(|| CommerceError::not_found("cart", buyer_key))?;

        match anonymous.user_id() {
            Some(owner) if owner == user_id => return Ok(anonymous),
            Some(_) => return Err(CommerceError::not_found("cart", buyer_key)),
            None => {}
        }

        let now = self.clock.now();
        match self.store.get_cart_by_user(user_id).await? {
            None => {
                let mut cart = anonymous;
                cart.assign_owner(user_id, buyer_key.clone(), now);
                self.reprice(&mut cart).await?;
                let version = match self.store.save_cart(&cart).await {
                    Ok(version) => version,
                    // The user's cart appeared meanwhile; retrying takes the merge path
                    Err(StoreError::UniqueViolation {
                        field: "user_id", ..
                    }) => {
                        return Err(CommerceError::Conflict {
                            entity: "cart",
                            id: cart.id().to_string(),
                        });
                    }
                    Err(e) => return Err(e.into()),
                };
                cart.set_version(version);
                tracing::info!(cart_id = %cart.id(), "Anonymous cart linked to user");
                Ok(cart)
            }
            Some(mut survivor) => {
                survivor.absorb(&anonymous, now);
                survivor.assign_owner(user_id, buyer_key.clone(), now);
                self.reprice(&mut survivor).await?;
                let version = self.store.merge_carts(&survivor, &anonymous).await?;
                survivor.set_version(version);
                tracing::info!(
                    cart_id = %survivor.id(),
                    discarded = %anonymous.id(),
                    "Anonymous cart merged into user cart"
                );
                Ok(survivor)
            }
        }
    }

    async fn create(&self, buyer_key: BuyerKey, user_id: Option<UserId>) -> Result<Cart> {
        let mut cart = Cart::new(buyer_key, user_id, self.clock.now());
        match self.store.save_cart(&cart).await {
            Ok(version) => {
                cart.set_version(version);
                tracing::info!(cart_id = %cart.id(), "Cart created");
                Ok(cart)
            }
            // Lost a creation race: the other request's cart is the buyer's cart
            Err(StoreError::UniqueViolation { .. }) => {
                let existing = match user_id {
                    Some(user_id) => self.store.get_cart_by_user(user_id).await?,
                    None => self.store.get_cart_by_buyer_key(cart.buyer_key()).await?,
                };
                existing.ok_or_else(|| CommerceError::Conflict {
                    entity: "cart",
                    id: cart.buyer_key().to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn reprice(&self, cart: &mut Cart) -> Result<()> {
        let catalog = self.store.get_products(&cart.product_ids()).await?;
        cart.refresh_pricing(&catalog);
        Ok(())
    }

    /// Runs a load-mutate-save cycle, replaying it on version conflicts.
    async fn modify<F>(&self, cart_id: CartId, product_id: Option<&ProductId>, apply: F) -> Result<Cart>
    where
        F: Fn(&mut Cart, &HashMap<ProductId, Product>, DateTime<Utc>) -> Result<()>,
    {
        let mut attempt = 0;
        loop {
            let mut cart = self.get_cart(cart_id).await?;

            let mut ids = cart.product_ids();
            if let Some(id) = product_id
                && !ids.contains(id)
            {
                ids.push(id.clone());
            }
            let catalog = self.store.get_products(&ids).await?;

            apply(&mut cart, &catalog, self.clock.now())?;
            cart.refresh_pricing(&catalog);

            match self.store.save_cart(&cart).await {
                Ok(version) => {
                    cart.set_version(version);
                    return Ok(cart);
                }
                Err(StoreError::ConcurrencyConflict { .. })
                    if attempt < self.policy.max_conflict_retries =>
                {
                    attempt += 1;
                    metrics::counter!("cart_conflict_retries_total").increment(1);
                    tracing::debug!(%cart_id, attempt, "Cart write conflicted, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
