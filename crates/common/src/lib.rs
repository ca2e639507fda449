//! Shared primitives for the storefront engine.
//!
//! Everything here is plain data with no I/O: typed identifiers, money in
//! minor units, discount percentages, version row stamps and the clock
//! abstraction used by time-based sweeps.

pub mod clock;
pub mod money;
pub mod types;
pub mod version;

pub use clock::{Clock, ManualClock, SystemClock};
pub use money::{Money, Percent, PercentOutOfRange};
pub use types::{BuyerKey, CartId, OrderId, ProductId, UserId};
pub use version::Version;
