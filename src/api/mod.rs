//! Remote backends that accept submitted forms
//!
//! - `forms`: the primary REST API (`createForm`, `getForms`, bulk session
//!   submit, submission status, health)
//! - `supabase`: the secondary store, a table upsert keyed by case and template

pub mod error;
pub mod forms;
pub mod supabase;

pub use error::ApiError;
pub use forms::{CreateFormRequest, FormListQuery, FormListResponse, FormRecord, FormsApi};
pub use supabase::{PatientFormRow, SupabaseStore};

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::store::{Answers, FormSession, PendingForm};

/// Client name sent with session submissions
pub const USER_AGENT: &str = concat!("clinical-capture/", env!("CARGO_PKG_VERSION"));

/// One locally stored form on its way to a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSubmission {
    /// Local pending form id
    pub pending_id: u64,
    pub template_id: String,
    pub case_id: String,
    pub volunteer_id: Option<String>,
    pub study_number: Option<String>,
    pub answers: Answers,
}

impl FormSubmission {
    /// Build from a stored form; identifiers from the case context win
    /// over the ones saved with the record
    pub fn from_pending(
        form: &PendingForm,
        volunteer_id: Option<&str>,
        study_number: Option<&str>,
    ) -> Self {
        Self {
            pending_id: form.id,
            template_id: form.template_id.clone(),
            case_id: form.case_id.clone(),
            volunteer_id: volunteer_id
                .map(str::to_string)
                .or_else(|| form.volunteer_id.clone()),
            study_number: study_number
                .map(str::to_string)
                .or_else(|| form.study_number.clone()),
            answers: form.answers.clone(),
        }
    }
}

/// Acknowledgement from the backend that stored a form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SubmissionReceipt {
    pub backend: String,
    /// Identifier assigned by the backend, when it returns one
    pub remote_id: Option<String>,
}

/// Every completed form of one session, sent in a single request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSubmission {
    pub case_id: String,
    pub volunteer_id: String,
    pub study_number: String,
    pub forms_data: BTreeMap<String, Answers>,
    pub metadata: SubmissionMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    pub submitted_at: DateTime<Utc>,
    pub user_agent: String,
    pub form_sequence: Vec<String>,
    pub completed_forms: Vec<String>,
}

impl SessionSubmission {
    pub fn new(
        session: &FormSession,
        forms_data: BTreeMap<String, Answers>,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            case_id: session.case_id.clone(),
            volunteer_id: session.volunteer_id.clone(),
            study_number: session.study_number.clone(),
            forms_data,
            metadata: SubmissionMetadata {
                submitted_at,
                user_agent: USER_AGENT.to_string(),
                form_sequence: session.navigation_state.form_sequence.clone(),
                completed_forms: session.completed_forms.iter().cloned().collect(),
            },
        }
    }
}

/// Backend answer to a [`SessionSubmission`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SessionReceipt {
    pub success: bool,
    pub case_id: String,
    #[serde(default)]
    pub submission_id: Option<String>,
    #[serde(default)]
    pub message: String,
    /// Field errors reported by the backend, keyed by form or field
    #[serde(default)]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

/// Whether a backend already holds a case's submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SubmissionStatus {
    #[serde(default)]
    pub submitted: bool,
    #[serde(default)]
    pub submission_id: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// A remote store that accepts submitted forms
#[async_trait]
pub trait FormBackend: Send + Sync {
    /// Backend name used in logs and reports (e.g., "forms-api", "supabase")
    fn name(&self) -> &str;

    /// Check if the backend has what it needs to be called
    fn is_configured(&self) -> bool;

    /// Store one form remotely
    async fn submit(&self, form: &FormSubmission) -> Result<SubmissionReceipt, ApiError>;

    /// Test connectivity to the backend
    async fn test_connection(&self) -> Result<bool, ApiError>;

    /// Store a whole session at once. Backends without a bulk endpoint
    /// reject it.
    async fn submit_session(
        &self,
        _session: &SessionSubmission,
    ) -> Result<SessionReceipt, ApiError> {
        Err(ApiError::rejected(
            self.name(),
            "session submission is not supported",
        ))
    }

    async fn submission_status(&self, _case_id: &str) -> Result<SubmissionStatus, ApiError> {
        Err(ApiError::rejected(
            self.name(),
            "submission status is not supported",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_submission_carries_metadata() {
        let mut session = FormSession::new(
            "case-3",
            "VOL-3",
            "ST-3",
            vec!["Demographic Details".to_string(), "ECG".to_string()],
        );
        session.complete(
            "Demographic Details",
            json!({"age": 52}).as_object().cloned().unwrap(),
        );
        let submitted_at = Utc::now();

        let bundle = SessionSubmission::new(&session, session.completed_data(), submitted_at);
        let value = serde_json::to_value(&bundle).unwrap();

        assert_eq!(value["case_id"], "case-3");
        assert_eq!(value["forms_data"]["Demographic Details"]["age"], json!(52));
        assert_eq!(value["metadata"]["form_sequence"].as_array().unwrap().len(), 2);
        assert_eq!(value["metadata"]["completed_forms"], json!(["Demographic Details"]));
        assert!(value["metadata"]["user_agent"]
            .as_str()
            .unwrap()
            .starts_with("clinical-capture/"));
    }

    #[test]
    fn test_receipt_tolerates_sparse_body() {
        let receipt: SessionReceipt =
            serde_json::from_value(json!({"success": true, "case_id": "case-3"})).unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.submission_id, None);
        assert!(receipt.errors.is_none());
    }
}
