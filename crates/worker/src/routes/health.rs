//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
    pub sweeps: Vec<&'static str>,
}

/// GET /health: reports liveness, the store backend and the scheduled sweeps.
pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        store: state.backend,
        sweeps: state.sweeps.clone(),
    })
}
