//! API error types and responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::ApiError as RemoteError;
use crate::flow::FlowError;
use crate::store::StoreError;
use crate::submission::SubmissionError;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found
    NotFound(String),
    /// Missing case, volunteer or study identifiers
    ValidationError(String),
    /// Internal server error
    InternalError(String),
    /// Bad request
    BadRequest(String),
    /// A remote backend failed or refused the call
    BadGateway(String),
}

/// Error response body
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            ApiError::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "backend_error", msg),
        };

        if status.is_server_error() {
            tracing::error!(error, message = %message, "Request failed");
        }

        (
            status,
            Json(ErrorResponse {
                error: error.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PendingFormNotFound(_) | StoreError::SessionNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            StoreError::StepOutOfRange { .. } | StoreError::FormNotInSequence { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            StoreError::Io { .. } | StoreError::Serialize(_) => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::Missing(_) => ApiError::ValidationError(err.to_string()),
            FlowError::UnknownForm(_) => ApiError::BadRequest(err.to_string()),
            FlowError::Store(e) => e.into(),
        }
    }
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::Validation(e) => e.into(),
            SubmissionError::Store(e) => e.into(),
            SubmissionError::NothingCompleted(_) => ApiError::BadRequest(err.to_string()),
            SubmissionError::Remote(e) => e.into(),
        }
    }
}

impl From<RemoteError> for ApiError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Rejected { .. } => ApiError::BadRequest(err.to_string()),
            RemoteError::NotConfigured { .. } => ApiError::InternalError(err.to_string()),
            _ => ApiError::BadGateway(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}
