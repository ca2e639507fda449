//! Domain layer for the storefront engine.
//!
//! This crate holds the pure rules of the cart-to-order flow:
//! - Product catalog entries and their sellable stock
//! - Cart aggregate with totals recomputation and the anonymous/user merge
//! - Reconciliation planning against live stock
//! - Order aggregate with immutable line snapshots and the status state machine
//!
//! Nothing here performs I/O; persistence lives in the `store` crate and
//! orchestration in `commerce`.

pub mod account;
pub mod cart;
pub mod order;
pub mod pricing;
pub mod product;

pub use account::{Account, AccountPolicy};
pub use cart::{Cart, CartError, CartItem, CartParts, ClampedItem, ReconciliationPlan};
pub use order::{
    Order, OrderCode, OrderError, OrderItem, OrderParts, OrderStatus, ParseOrderStatusError,
    StatusChange,
};
pub use pricing::{PricedLine, Totals};
pub use product::{Product, ProductError};
