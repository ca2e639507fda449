//! Worker startup errors.

use metrics_exporter_prometheus::BuildError;
use store::StoreError;

/// Errors that stop the worker from starting or serving.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Database connection failed: {0}")]
    Connect(#[from] sqlx::Error),

    #[error("Metrics recorder could not be installed: {0}")]
    Metrics(#[from] BuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
