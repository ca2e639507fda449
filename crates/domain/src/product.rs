//! Catalog product as seen by the cart and order flow.

use common::{Money, Percent, ProductId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a catalog entry violates its invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProductError {
    /// Price must be strictly positive.
    #[error("Invalid price for {product_id}: {price} (must be greater than 0)")]
    InvalidPrice { product_id: ProductId, price: Money },
}

/// A sellable product.
///
/// The catalog owns products; carts and orders only reference them. The
/// stock counter is mutated exclusively through the inventory store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub description: String,
    /// Image reference (CDN path or URL).
    pub image: Option<String>,
    pub price: Money,
    pub discount: Percent,
    pub stock: u32,
    /// Whether the product is listed for sale.
    pub available: bool,
}

impl Product {
    /// Creates an available product with no stock and no discount.
    pub fn new(id: impl Into<ProductId>, title: impl Into<String>, price: Money) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            image: None,
            price,
            discount: Percent::zero(),
            stock: 0,
            available: true,
        }
    }

    pub fn with_stock(mut self, stock: u32) -> Self {
        self.stock = stock;
        self
    }

    pub fn with_discount(mut self, discount: Percent) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Units that can currently be sold. Unlisted products sell nothing.
    pub fn sellable_stock(&self) -> u32 {
        if self.available { self.stock } else { 0 }
    }

    /// Checks catalog invariants before the product is written.
    pub fn validate(&self) -> Result<(), ProductError> {
        if !self.price.is_positive() {
            return Err(ProductError::InvalidPrice {
                product_id: self.id.clone(),
                price: self.price,
            });
        }
        Ok(())
    }
}
