//! Persistence for the storefront engine.
//!
//! The store traits are the only way the services touch persisted state.
//! Every multi-record write (checkout, cart merge, status change) is a
//! single store operation so implementations can run it in one transaction.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{CheckoutFailPoint, InMemoryStore};
pub use postgres::PostgresStore;
pub use store::{
    AccountStore, CartStore, CheckoutCommit, InventoryStore, OrderStore, ReminderStore, Store,
};
