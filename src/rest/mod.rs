//! Local REST API over the capture core.
//!
//! Lets a UI process read and write cached answers, drive form sessions,
//! resolve stepper positions and trigger submission without touching the
//! store file itself.

use std::net::SocketAddr;

use anyhow::Result;
use axum::{
    http::header,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::ApiState;

/// Default port for the REST API server
pub const DEFAULT_PORT: u16 = 7010;

/// Build the API router with all routes
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route("/api/v1/health", get(routes::health::health))
        .route("/api/v1/status", get(routes::health::status))
        // Pending form endpoints
        .route("/api/v1/pending", get(routes::forms::list_pending))
        .route(
            "/api/v1/cases/:case_id/forms/:template",
            get(routes::forms::get_answers).put(routes::forms::save_answers),
        )
        // Session endpoints
        .route(
            "/api/v1/cases/:case_id/session",
            get(routes::sessions::get_session)
                .post(routes::sessions::start_session)
                .delete(routes::sessions::clear_session),
        )
        .route(
            "/api/v1/cases/:case_id/session/complete",
            post(routes::sessions::complete_form),
        )
        .route(
            "/api/v1/cases/:case_id/session/navigate",
            post(routes::sessions::navigate),
        )
        .route(
            "/api/v1/cases/:case_id/pages/:form_id/:page",
            put(routes::sessions::save_page),
        )
        // Submission endpoints
        .route(
            "/api/v1/cases/:case_id/submit",
            post(routes::submission::submit_case),
        )
        .route(
            "/api/v1/cases/:case_id/session/submit",
            post(routes::submission::submit_session),
        )
        .route(
            "/api/v1/cases/:case_id/submission-status",
            get(routes::submission::submission_status),
        )
        .route("/api/v1/sync", post(routes::submission::sync))
        // Stepper endpoints
        .route("/api/v1/stepper/resolve", post(routes::stepper::resolve))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> impl IntoResponse {
    match ApiDoc::json() {
        Ok(spec) => ([(header::CONTENT_TYPE, "application/json")], spec).into_response(),
        Err(e) => error::ApiError::InternalError(e.to_string()).into_response(),
    }
}

/// Start the REST API server; returns after Ctrl-C
pub async fn serve(state: ApiState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    tracing::info!("REST API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("REST API shutting down");
        })
        .await?;

    Ok(())
}
