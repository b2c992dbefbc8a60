//! Data Transfer Objects for the REST API.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::flow::{CaseContext, Direction};
use crate::stepper::StepPosition;
use crate::store::{Answers, ClearSummary, FormPage, FormSession, PendingForm};
use crate::submission::{SubmissionOutcome, SubmissionReport};

// =============================================================================
// Health DTOs
// =============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub pending_forms: usize,
    pub unsynced_forms: usize,
    pub sessions: usize,
    pub primary_backend: String,
    pub primary_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_backend: Option<String>,
}

// =============================================================================
// Pending form DTOs
// =============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PendingFormResponse {
    pub id: u64,
    pub template_id: String,
    pub case_id: String,
    #[schema(value_type = Object)]
    pub answers: Answers,
    pub volunteer_id: Option<String>,
    pub study_number: Option<String>,
    pub synced: bool,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl From<PendingForm> for PendingFormResponse {
    fn from(form: PendingForm) -> Self {
        Self {
            id: form.id,
            template_id: form.template_id,
            case_id: form.case_id,
            answers: form.answers,
            volunteer_id: form.volunteer_id,
            study_number: form.study_number,
            synced: form.synced,
            created_at: form.created_at,
            last_modified: form.last_modified,
        }
    }
}

/// Filters for `GET /api/v1/pending`
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PendingQuery {
    pub case_id: Option<String>,
    /// Only records not yet accepted by a backend
    #[serde(default)]
    pub unsynced: bool,
}

/// Body of `PUT /api/v1/cases/{case_id}/forms/{template}`
#[derive(Debug, Deserialize, ToSchema)]
pub struct SaveAnswersRequest {
    #[schema(value_type = Object)]
    pub answers: Answers,
    pub volunteer_id: Option<String>,
    pub study_number: Option<String>,
    /// Navigate after saving; requires `project`
    pub direction: Option<Direction>,
    pub project: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SaveAnswersResponse {
    pub form: PendingFormResponse,
    /// Route of the neighbouring form, when navigation was requested
    pub next_route: Option<String>,
}

// =============================================================================
// Session DTOs
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct StartSessionRequest {
    pub volunteer_id: String,
    pub study_number: String,
    /// Defaults to the configured form sequence
    pub form_sequence: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub case_id: String,
    pub volunteer_id: String,
    pub study_number: String,
    pub current_form: Option<String>,
    pub current_step: usize,
    pub total_steps: usize,
    pub form_sequence: Vec<String>,
    pub can_navigate_next: bool,
    pub can_navigate_previous: bool,
    pub completed_forms: Vec<String>,
    #[schema(value_type = Object)]
    pub form_data: BTreeMap<String, Value>,
    pub validation_errors: BTreeMap<String, Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl From<&FormSession> for SessionResponse {
    fn from(session: &FormSession) -> Self {
        Self {
            case_id: session.case_id.clone(),
            volunteer_id: session.volunteer_id.clone(),
            study_number: session.study_number.clone(),
            current_form: session.current_form.clone(),
            current_step: session.navigation_state.current_step,
            total_steps: session.navigation_state.total_steps,
            form_sequence: session.navigation_state.form_sequence.clone(),
            can_navigate_next: session.navigation_state.can_navigate_next(),
            can_navigate_previous: session.navigation_state.can_navigate_previous(),
            completed_forms: session.completed_forms.iter().cloned().collect(),
            form_data: session
                .form_data
                .iter()
                .map(|(k, v)| (k.clone(), Value::Object(v.clone())))
                .collect(),
            validation_errors: session.validation_errors.clone(),
            created_at: session.created_at,
            last_modified: session.last_modified,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompleteFormRequest {
    pub template_id: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub answers: Answers,
}

/// Body of `POST /api/v1/cases/{case_id}/session/navigate`.
/// Exactly one of `direction` and `template_id` is given.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct NavigateRequest {
    pub direction: Option<Direction>,
    pub template_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NavigateResponse {
    /// False when the session was already at the edge of its sequence
    pub moved: bool,
    pub session: SessionResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClearSessionResponse {
    pub sessions: usize,
    pub pages: usize,
    pub pending_forms: usize,
}

impl From<ClearSummary> for ClearSessionResponse {
    fn from(summary: ClearSummary) -> Self {
        Self {
            sessions: summary.sessions,
            pages: summary.pages,
            pending_forms: summary.pending_forms,
        }
    }
}

// =============================================================================
// Page DTOs
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct SavePageRequest {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Answers,
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub validation_errors: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PageResponse {
    pub case_id: String,
    pub form_id: String,
    pub page_name: String,
    #[schema(value_type = Object)]
    pub data: Answers,
    pub is_valid: bool,
    pub validation_errors: Vec<String>,
    pub last_modified: DateTime<Utc>,
}

impl From<FormPage> for PageResponse {
    fn from(page: FormPage) -> Self {
        Self {
            case_id: page.case_id,
            form_id: page.form_id,
            page_name: page.page_name,
            data: page.data,
            is_valid: page.is_valid,
            validation_errors: page.validation_errors,
            last_modified: page.last_modified,
        }
    }
}

// =============================================================================
// Submission DTOs
// =============================================================================

/// Identifiers completing the case from the path
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SubmitRequest {
    pub volunteer_id: Option<String>,
    pub study_number: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmissionResponse {
    pub outcome: SubmissionOutcome,
    pub message: String,
    pub report: SubmissionReport,
}

impl From<SubmissionReport> for SubmissionResponse {
    fn from(report: SubmissionReport) -> Self {
        Self {
            outcome: report.outcome(),
            message: report.message(),
            report,
        }
    }
}

// =============================================================================
// Stepper DTOs
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveRequest {
    /// Current location, `path?query`
    pub location: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResolveResponse {
    pub position: StepPosition,
    pub progress: String,
    pub percentage_complete: u8,
    pub context: CaseContext,
}
