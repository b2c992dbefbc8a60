use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::report::{ItemOutcome, SubmissionReport};
use super::SubmissionError;
use crate::api::{
    ApiError, FormBackend, FormSubmission, FormsApi, SessionReceipt, SessionSubmission,
    SubmissionStatus, SupabaseStore,
};
use crate::config::Config;
use crate::flow::CaseContext;
use crate::store::{LocalStore, PendingForm, StoreError};

/// Sequential primary-then-fallback submitter
pub struct SubmissionQueue {
    primary: Arc<dyn FormBackend>,
    fallback: Option<Arc<dyn FormBackend>>,
}

impl SubmissionQueue {
    pub fn new(primary: Arc<dyn FormBackend>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FormBackend>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Primary API from `[api]`, fallback from `[supabase]` when enabled
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let queue = Self::new(Arc::new(FormsApi::from_config(config)?));
        Ok(match SupabaseStore::from_config(config)? {
            Some(store) => queue.with_fallback(Arc::new(store)),
            None => queue,
        })
    }

    pub fn primary(&self) -> &dyn FormBackend {
        self.primary.as_ref()
    }

    pub fn fallback(&self) -> Option<&dyn FormBackend> {
        self.fallback.as_deref()
    }

    /// Submit every unsynced form of a case.
    ///
    /// All three identifiers must be present. Forms saved for another
    /// volunteer of the same case are left alone.
    pub async fn submit_case(
        &self,
        store: &mut LocalStore,
        context: &CaseContext,
    ) -> Result<SubmissionReport, SubmissionError> {
        let ids = context.require_complete()?;

        let forms: Vec<PendingForm> = store
            .pending_forms_for_case(ids.case_id, None)
            .into_iter()
            .filter(|f| f.volunteer_id.as_deref().map_or(true, |v| v == ids.volunteer_id))
            .collect();

        let (synced, unsynced): (Vec<_>, Vec<_>) = forms.into_iter().partition(|f| f.synced);
        let mut report = SubmissionReport {
            skipped: synced.len(),
            ..Default::default()
        };

        info!(
            case_id = ids.case_id,
            pending = unsynced.len(),
            skipped = report.skipped,
            "Submitting case forms"
        );

        for form in &unsynced {
            let submission =
                FormSubmission::from_pending(form, Some(ids.volunteer_id), Some(ids.study_number));
            let item = self.submit_one(store, &submission).await;
            report.record(item);
        }

        info!(
            case_id = ids.case_id,
            succeeded = report.succeeded,
            total = report.total,
            "{}",
            report.message()
        );
        Ok(report)
    }

    /// Submit every unsynced form in the store, whatever its case
    pub async fn sync_pending(&self, store: &mut LocalStore) -> SubmissionReport {
        let unsynced = store.unsynced_forms();
        let mut report = SubmissionReport {
            skipped: store.pending_forms_count() - unsynced.len(),
            ..Default::default()
        };

        for form in &unsynced {
            let submission = FormSubmission::from_pending(form, None, None);
            let item = self.submit_one(store, &submission).await;
            report.record(item);
        }

        info!(
            succeeded = report.succeeded,
            total = report.total,
            "Synced pending forms"
        );
        report
    }

    /// Send the completed forms of a case's session to the primary API in
    /// one request.
    ///
    /// Local records of the case are cleared only when the API reports
    /// success; otherwise they stay for another attempt.
    pub async fn submit_session(
        &self,
        store: &mut LocalStore,
        case_id: &str,
    ) -> Result<SessionReceipt, SubmissionError> {
        let forms_data = store.completed_forms_data(case_id)?;
        if forms_data.is_empty() {
            return Err(SubmissionError::NothingCompleted(case_id.to_string()));
        }
        let session = store
            .session(case_id)
            .ok_or_else(|| StoreError::SessionNotFound(case_id.to_string()))?;
        let submission = SessionSubmission::new(session, forms_data, Utc::now());

        info!(
            case_id,
            forms = submission.forms_data.len(),
            backend = self.primary.name(),
            "Submitting form session"
        );
        let receipt = self.primary.submit_session(&submission).await?;

        if receipt.success {
            // The API holds the session now; stale local rows only cost space.
            if let Err(e) = store.clear_session(case_id) {
                warn!(case_id, error = %e, "Failed to clear submitted session");
            }
            info!(case_id, submission_id = ?receipt.submission_id, "Form session submitted");
        } else {
            warn!(case_id, message = %receipt.message, "Form session refused");
        }
        Ok(receipt)
    }

    /// Ask the primary API whether a case was already submitted
    pub async fn submission_status(&self, case_id: &str) -> Result<SubmissionStatus, SubmissionError> {
        Ok(self.primary.submission_status(case_id).await?)
    }

    async fn submit_one(&self, store: &mut LocalStore, form: &FormSubmission) -> ItemOutcome {
        let mut item = ItemOutcome {
            pending_id: form.pending_id,
            template_id: form.template_id.clone(),
            case_id: form.case_id.clone(),
            backend: None,
            remote_id: None,
            errors: Vec::new(),
        };

        let backends = std::iter::once(&self.primary).chain(self.fallback.as_ref());
        for backend in backends {
            match backend.submit(form).await {
                Ok(receipt) => {
                    item.backend = Some(receipt.backend);
                    item.remote_id = receipt.remote_id;
                    break;
                }
                Err(e) => {
                    warn!(
                        pending_id = form.pending_id,
                        template = %form.template_id,
                        backend = backend.name(),
                        error = %e,
                        "Form submission failed"
                    );
                    item.errors.push(e.to_string());
                }
            }
        }

        if item.succeeded() {
            // The backend has the form; a failed local flag only means it
            // is sent again next time.
            if let Err(e) = store.mark_synced(form.pending_id) {
                warn!(pending_id = form.pending_id, error = %e, "Failed to mark form synced");
            }
        }
        item
    }
}
