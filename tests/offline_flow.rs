//! Integration tests for the offline capture flow
//!
//! Drives the public library API against a store file in a temp directory:
//! saving answers step by step, reopening the store, submitting through
//! in-process backends, and clearing a case.

use std::fs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use clinical_capture::api::{ApiError, FormBackend, FormSubmission, SubmissionReceipt};
use clinical_capture::config::Config;
use clinical_capture::flow::{CaseContext, Direction, FormFlow};
use clinical_capture::store::{Answers, LocalStore};
use clinical_capture::submission::{SubmissionOutcome, SubmissionQueue};

// ─── Test doubles ─────────────────────────────────────────────────────────────

/// Backend that accepts everything except the listed templates
struct RecordingBackend {
    name: &'static str,
    refuse: Vec<&'static str>,
    received: Mutex<Vec<FormSubmission>>,
}

impl RecordingBackend {
    fn new(name: &'static str, refuse: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            name,
            refuse,
            received: Mutex::new(Vec::new()),
        })
    }

    fn received(&self) -> Vec<FormSubmission> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl FormBackend for RecordingBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn submit(&self, form: &FormSubmission) -> Result<SubmissionReceipt, ApiError> {
        if self.refuse.contains(&form.template_id.as_str()) {
            return Err(ApiError::network(self.name, "connection refused"));
        }
        self.received.lock().unwrap().push(form.clone());
        Ok(SubmissionReceipt {
            backend: self.name.to_string(),
            remote_id: Some(format!("{}-{}", self.name, form.pending_id)),
        })
    }

    async fn test_connection(&self) -> Result<bool, ApiError> {
        Ok(true)
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

struct TestContext {
    _temp_dir: TempDir,
    config: Config,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = Config::default();
        config.paths.state = temp_dir.path().join("state").to_string_lossy().to_string();
        Self {
            _temp_dir: temp_dir,
            config,
        }
    }

    fn open(&self) -> LocalStore {
        LocalStore::open(self.config.store_path()).expect("Failed to open store")
    }

    fn flow(&self) -> FormFlow {
        FormFlow::from_config(&self.config.flow)
    }
}

fn answers(value: serde_json::Value) -> Answers {
    value.as_object().cloned().expect("answers must be an object")
}

fn case() -> CaseContext {
    CaseContext::new("case-17", "VOL-0042", "STUDY-7")
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn test_answers_survive_reopen() {
    let ctx = TestContext::new();
    let flow = ctx.flow();

    {
        let mut store = ctx.open();
        let (_, next) = flow
            .save_and_navigate(
                &mut store,
                "proj-1",
                &case(),
                "Demographic Details",
                answers(json!({"age": 34, "sex": "F"})),
                Direction::Next,
            )
            .unwrap();
        assert!(next.unwrap().contains("/screening/medical-history?case=case-17"));
    }

    let store = ctx.open();
    let saved = store.load_answers("Demographic Details", "case-17").unwrap();
    assert_eq!(saved["age"], json!(34));
    assert_eq!(store.pending_forms_count(), 1);
}

#[test]
fn test_resave_updates_in_place() {
    let ctx = TestContext::new();
    let flow = ctx.flow();
    let mut store = ctx.open();

    for heart_rate in [70, 74] {
        flow.save_and_navigate(
            &mut store,
            "proj-1",
            &case(),
            "ECG",
            answers(json!({"heart_rate": heart_rate})),
            Direction::Next,
        )
        .unwrap();
    }

    let forms = store.pending_forms_for_case("case-17", None);
    assert_eq!(forms.len(), 1);
    assert_eq!(forms[0].answers["heart_rate"], json!(74));
}

#[tokio::test]
async fn test_partial_batch_keeps_failed_record_for_later() {
    let ctx = TestContext::new();
    let flow = ctx.flow();
    let mut store = ctx.open();

    for title in ["Medical History", "ECG", "COVID-19 Screening"] {
        flow.save_and_navigate(
            &mut store,
            "proj-1",
            &case(),
            title,
            answers(json!({"done": true})),
            Direction::Next,
        )
        .unwrap();
    }

    let primary = RecordingBackend::new("primary", vec!["ECG"]);
    let queue = SubmissionQueue::new(primary.clone());
    let report = queue.submit_case(&mut store, &case()).await.unwrap();

    assert_eq!(
        report.outcome(),
        SubmissionOutcome::Partial {
            succeeded: 2,
            total: 3
        }
    );
    assert!(primary
        .received()
        .iter()
        .all(|f| f.study_number.as_deref() == Some("STUDY-7")));
    drop(store);

    // The synced flags were persisted; only the failed form is left
    let mut store = ctx.open();
    let unsynced = store.unsynced_forms();
    assert_eq!(unsynced.len(), 1);
    assert_eq!(unsynced[0].template_id, "ECG");

    let retry = SubmissionQueue::new(RecordingBackend::new("primary", vec![]));
    let report = retry.submit_case(&mut store, &case()).await.unwrap();
    assert_eq!(report.outcome(), SubmissionOutcome::AllSucceeded);
    assert_eq!((report.total, report.skipped), (1, 2));
}

#[test]
fn test_corrupt_store_is_set_aside() {
    let ctx = TestContext::new();
    let path = ctx.config.store_path();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "{ not json").unwrap();

    let store = ctx.open();
    assert_eq!(store.pending_forms_count(), 0);
    assert!(path.with_extension("json.corrupt").exists());
}

#[test]
fn test_clear_session_removes_case_records() {
    let ctx = TestContext::new();
    let mut store = ctx.open();
    let sequence = ctx.config.flow.form_sequence.clone();

    store
        .start_session("case-17", "VOL-0042", "STUDY-7", sequence.clone())
        .unwrap();
    store
        .save_page("case-17", "ecg", "leads", Answers::new(), true, vec![])
        .unwrap();
    store
        .save_answers("ECG", "case-17", Answers::new(), None, None)
        .unwrap();
    store
        .start_session("case-18", "VOL-0043", "STUDY-7", sequence)
        .unwrap();
    store
        .save_page("case-18", "ecg", "leads", Answers::new(), false, vec![])
        .unwrap();

    let summary = store.clear_session("case-17").unwrap();
    assert_eq!(
        (summary.sessions, summary.pages, summary.pending_forms),
        (1, 1, 1)
    );
    drop(store);

    let store = ctx.open();
    assert!(store.session("case-17").is_none());
    assert!(store.page("case-17", "ecg", "leads").is_none());
    assert!(store.page("case-18", "ecg", "leads").is_some());
    assert!(store.session("case-18").is_some());
}
