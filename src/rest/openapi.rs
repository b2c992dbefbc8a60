//! OpenAPI specification builder using utoipa.

use utoipa::OpenApi;

use crate::api::{SessionReceipt, SubmissionReceipt, SubmissionStatus};
use crate::flow::{CaseContext, Direction};
use crate::rest::dto::{
    ClearSessionResponse, CompleteFormRequest, HealthResponse, NavigateRequest, NavigateResponse,
    PageResponse, PendingFormResponse, ResolveRequest, ResolveResponse, SaveAnswersRequest,
    SaveAnswersResponse, SavePageRequest, SessionResponse, StartSessionRequest, StatusResponse,
    SubmissionResponse, SubmitRequest,
};
use crate::rest::error::ErrorResponse;
use crate::stepper::StepPosition;
use crate::submission::{ItemOutcome, SubmissionOutcome, SubmissionReport};

/// OpenAPI documentation for the capture REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Clinical Capture API",
        version = "0.3.0",
        description = "Local API over the offline form store, the form stepper and the submission queue.",
        license(name = "MIT")
    ),
    paths(
        // Health endpoints
        crate::rest::routes::health::health,
        crate::rest::routes::health::status,
        // Pending form endpoints
        crate::rest::routes::forms::list_pending,
        crate::rest::routes::forms::get_answers,
        crate::rest::routes::forms::save_answers,
        // Session endpoints
        crate::rest::routes::sessions::get_session,
        crate::rest::routes::sessions::start_session,
        crate::rest::routes::sessions::clear_session,
        crate::rest::routes::sessions::complete_form,
        crate::rest::routes::sessions::navigate,
        crate::rest::routes::sessions::save_page,
        // Submission endpoints
        crate::rest::routes::submission::submit_case,
        crate::rest::routes::submission::submit_session,
        crate::rest::routes::submission::submission_status,
        crate::rest::routes::submission::sync,
        // Stepper endpoints
        crate::rest::routes::stepper::resolve,
    ),
    components(
        schemas(
            // Response types
            HealthResponse,
            StatusResponse,
            PendingFormResponse,
            SaveAnswersResponse,
            SessionResponse,
            NavigateResponse,
            ClearSessionResponse,
            PageResponse,
            SubmissionResponse,
            SubmissionReport,
            SubmissionOutcome,
            SubmissionReceipt,
            SessionReceipt,
            SubmissionStatus,
            ItemOutcome,
            ResolveResponse,
            StepPosition,
            CaseContext,
            ErrorResponse,
            // Request types
            SaveAnswersRequest,
            StartSessionRequest,
            CompleteFormRequest,
            NavigateRequest,
            SavePageRequest,
            SubmitRequest,
            ResolveRequest,
            Direction,
        )
    ),
    tags(
        (name = "Health", description = "Health check and status endpoints"),
        (name = "Forms", description = "Locally cached form answers"),
        (name = "Sessions", description = "Form sessions and page state per case"),
        (name = "Submission", description = "Pushing cached forms to the backends"),
        (name = "Stepper", description = "Previous/next navigation"),
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI specification as a JSON string
    pub fn json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
