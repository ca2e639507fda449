//! Application services of the storefront engine.
//!
//! This crate drives the cart-to-order flow on top of the `store` ports:
//! 1. Cart mutations with optimistic retries
//! 2. Checkout reconciliation against live stock
//! 3. Atomic order creation with stock decrement
//! 4. Guarded order status transitions with an audit trail
//!
//! It also hosts the periodic cleanup sweeps run by the worker.

pub mod cart_service;
pub mod checkout;
pub mod error;
pub mod notifications;
pub mod order_factory;
pub mod order_status;
pub mod reconciler;
pub mod retry;
pub mod sweeps;

pub use cart_service::{CartPolicy, CartService};
pub use checkout::{Checkout, CheckoutOutcome};
pub use error::{CommerceError, Result};
pub use notifications::{CartSummary, InMemoryNotifier, LoggingNotifier, Notifier, SentReminder};
pub use order_factory::{CheckoutPolicy, OrderFactory};
pub use order_status::OrderStatusService;
pub use reconciler::{CheckoutReconciler, Reconciliation};
pub use retry::RetryPolicy;
pub use sweeps::{AbandonedCartSweep, Sweep, SweepReport, UnconfirmedAccountSweep};
