//! Submission endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::{SessionReceipt, SubmissionStatus};
use crate::flow::CaseContext;
use crate::rest::dto::{SubmissionResponse, SubmitRequest};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;

/// Submit the unsynced forms of a case
#[utoipa::path(
    post,
    path = "/api/v1/cases/{case_id}/submit",
    tag = "Submission",
    params(
        ("case_id" = String, Path, description = "Case id")
    ),
    request_body = SubmitRequest,
    responses(
        (status = 200, description = "Batch report, including partial failures", body = SubmissionResponse),
        (status = 400, description = "Missing identifiers", body = ErrorResponse)
    )
)]
pub async fn submit_case(
    State(state): State<ApiState>,
    Path(case_id): Path<String>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let context = CaseContext {
        case_id: Some(case_id),
        volunteer_id: request.volunteer_id,
        study_number: request.study_number,
    };

    let mut store = state.store.lock().await;
    let report = state.queue.submit_case(&mut store, &context).await?;
    Ok(Json(SubmissionResponse::from(report)))
}

/// Send the completed forms of a session to the API in one request
#[utoipa::path(
    post,
    path = "/api/v1/cases/{case_id}/session/submit",
    tag = "Submission",
    params(
        ("case_id" = String, Path, description = "Case id")
    ),
    responses(
        (status = 200, description = "API answer; local records are cleared on success", body = SessionReceipt),
        (status = 400, description = "Nothing completed yet", body = ErrorResponse),
        (status = 404, description = "No session for this case", body = ErrorResponse),
        (status = 502, description = "API unreachable or failed", body = ErrorResponse)
    )
)]
pub async fn submit_session(
    State(state): State<ApiState>,
    Path(case_id): Path<String>,
) -> Result<Json<SessionReceipt>, ApiError> {
    let mut store = state.store.lock().await;
    let receipt = state.queue.submit_session(&mut store, &case_id).await?;
    Ok(Json(receipt))
}

/// Ask the API whether a case was already submitted
#[utoipa::path(
    get,
    path = "/api/v1/cases/{case_id}/submission-status",
    tag = "Submission",
    params(
        ("case_id" = String, Path, description = "Case id")
    ),
    responses(
        (status = 200, description = "Submission state held by the API", body = SubmissionStatus),
        (status = 502, description = "API unreachable or failed", body = ErrorResponse)
    )
)]
pub async fn submission_status(
    State(state): State<ApiState>,
    Path(case_id): Path<String>,
) -> Result<Json<SubmissionStatus>, ApiError> {
    let status = state.queue.submission_status(&case_id).await?;
    Ok(Json(status))
}

/// Submit every unsynced form in the store
#[utoipa::path(
    post,
    path = "/api/v1/sync",
    tag = "Submission",
    responses(
        (status = 200, description = "Batch report", body = SubmissionResponse)
    )
)]
pub async fn sync(State(state): State<ApiState>) -> Json<SubmissionResponse> {
    let mut store = state.store.lock().await;
    let report = state.queue.sync_pending(&mut store).await;
    Json(SubmissionResponse::from(report))
}
