//! Background worker for the storefront engine.
//!
//! Runs the cleanup sweeps on their schedules and exposes `/health` and
//! `/metrics` for operators, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod scheduler;

use axum::Router;
use axum::routing::get;
use commerce::{AbandonedCartSweep, LoggingNotifier, Notifier, UnconfirmedAccountSweep};
use domain::AccountPolicy;
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use error::WorkerError;
pub use scheduler::Scheduler;

/// Shared state of the operator endpoints.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Name of the store backend in use.
    pub backend: &'static str,
    /// Names of the scheduled sweeps.
    pub sweeps: Vec<&'static str>,
}

/// Creates the Axum router with the operator endpoints.
pub fn create_app(state: AppState, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .with_state(state)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}

/// Builds the scheduler with both sweeps configured from `config`.
pub fn create_scheduler<S: Store, N: Notifier + 'static>(
    config: &Config,
    store: S,
    notifier: N,
) -> Scheduler {
    let accounts = UnconfirmedAccountSweep::new(
        store.clone(),
        AccountPolicy::new(config.account_confirmation_grace),
    );
    let carts = AbandonedCartSweep::new(
        store,
        notifier,
        config.abandoned_cart_after,
        config.storefront_url.clone(),
    );

    Scheduler::new()
        .every(config.account_sweep_interval, accounts)
        .every(config.cart_sweep_interval, carts)
}

/// Serves the operator endpoints and runs the sweeps until `shutdown` resolves.
///
/// Sweeps are stopped after the server has drained, and any pass in
/// progress is allowed to finish.
pub async fn run<S: Store>(
    config: &Config,
    store: S,
    backend: &'static str,
    metrics_handle: PrometheusHandle,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), WorkerError> {
    let scheduler = create_scheduler(config, store, LoggingNotifier);
    let state = AppState {
        backend,
        sweeps: scheduler.names(),
    };

    let stop = tokio_util::sync::CancellationToken::new();
    let mut sweeps = scheduler.start(stop.clone());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, backend, "Worker listening");

    let served = axum::serve(listener, create_app(state, metrics_handle))
        .with_graceful_shutdown(shutdown)
        .await;

    stop.cancel();
    while sweeps.join_next().await.is_some() {}

    served.map_err(WorkerError::from)
}
