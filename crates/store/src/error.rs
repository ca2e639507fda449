use common::{ProductId, Version};
use domain::ProductError;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record changed since it was read.
    ///
    /// `actual` is `Version::initial()` when the record no longer exists.
    #[error(
        "Concurrency conflict for {entity} {id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        entity: &'static str,
        id: String,
        expected: Version,
        actual: Version,
    },

    /// A conditional stock decrement found fewer units than requested.
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// A unique key is already taken.
    #[error("Duplicate {entity} {field}: {value}")]
    UniqueViolation {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    /// The record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A product failed catalog validation.
    #[error("Invalid product: {0}")]
    InvalidProduct(#[from] ProductError),

    /// Persisted data could not be mapped back to the domain.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// The backend is unavailable or failed mid-operation.
    #[error("Backend failure: {0}")]
    Backend(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn conflict(
        entity: &'static str,
        id: impl ToString,
        expected: Version,
        actual: Version,
    ) -> Self {
        StoreError::ConcurrencyConflict {
            entity,
            id: id.to_string(),
            expected,
            actual,
        }
    }

    /// Returns true for failures worth retrying later (I/O, not logic).
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Database(_) | StoreError::Backend(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
