//! Health check and status endpoints.

use axum::{extract::State, Json};

use crate::rest::dto::{HealthResponse, StatusResponse};
use crate::rest::state::ApiState;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get service status with store counts and configured backends
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "Health",
    responses(
        (status = 200, description = "Service status with store info", body = StatusResponse)
    )
)]
pub async fn status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let store = state.store.lock().await;

    Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pending_forms: store.pending_forms_count(),
        unsynced_forms: store.unsynced_forms().len(),
        sessions: store.sessions().len(),
        primary_backend: state.queue.primary().name().to_string(),
        primary_configured: state.queue.primary().is_configured(),
        fallback_backend: state
            .queue
            .fallback()
            .filter(|b| b.is_configured())
            .map(|b| b.name().to_string()),
    })
}
