//! Record kinds held by the local store.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Form answers keyed by field name. Contents are opaque to the store.
pub type Answers = serde_json::Map<String, Value>;

/// A row kept in a [`Table`](super::Table)
pub trait Record: Clone {
    type Key: Ord + Clone + std::fmt::Debug;

    fn key(&self) -> Self::Key;

    /// Stamp the record as modified at `now`
    fn touch(&mut self, now: DateTime<Utc>);
}

/// Answers for one template of one case, cached until a backend accepts them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingForm {
    pub id: u64,
    pub template_id: String,
    #[serde(alias = "patient_id")]
    pub case_id: String,
    #[serde(default)]
    pub answers: Answers,
    #[serde(default)]
    pub volunteer_id: Option<String>,
    #[serde(default)]
    pub study_number: Option<String>,
    #[serde(default)]
    pub synced: bool,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl Record for PendingForm {
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_modified = now;
    }
}

/// Fields supplied by the caller when a pending form is first stored
#[derive(Debug, Clone, Default)]
pub struct NewPendingForm {
    pub template_id: String,
    pub case_id: String,
    pub answers: Answers,
    pub volunteer_id: Option<String>,
    pub study_number: Option<String>,
}

/// Position of a case within its ordered form sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationState {
    pub current_step: usize,
    pub total_steps: usize,
    pub form_sequence: Vec<String>,
}

impl NavigationState {
    pub fn new(form_sequence: Vec<String>) -> Self {
        Self {
            current_step: 0,
            total_steps: form_sequence.len(),
            form_sequence,
        }
    }

    /// Template at the current step, `None` once every step is done
    pub fn current_template(&self) -> Option<&str> {
        self.form_sequence
            .get(self.current_step)
            .map(String::as_str)
    }

    pub fn index_of(&self, template: &str) -> Option<usize> {
        self.form_sequence.iter().position(|t| t == template)
    }

    pub fn is_finished(&self) -> bool {
        self.current_step >= self.total_steps
    }

    pub fn can_navigate_next(&self) -> bool {
        self.current_step + 1 < self.total_steps
    }

    pub fn can_navigate_previous(&self) -> bool {
        self.current_step > 0
    }
}

/// Progress of one case through the form flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSession {
    pub case_id: String,
    pub volunteer_id: String,
    pub study_number: String,
    #[serde(default)]
    pub current_form: Option<String>,
    #[serde(default)]
    pub completed_forms: BTreeSet<String>,
    #[serde(default)]
    pub form_data: BTreeMap<String, Answers>,
    pub navigation_state: NavigationState,
    #[serde(default)]
    pub validation_errors: BTreeMap<String, Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl FormSession {
    pub fn new(
        case_id: impl Into<String>,
        volunteer_id: impl Into<String>,
        study_number: impl Into<String>,
        form_sequence: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        let navigation_state = NavigationState::new(form_sequence);
        Self {
            case_id: case_id.into(),
            volunteer_id: volunteer_id.into(),
            study_number: study_number.into(),
            current_form: navigation_state.current_template().map(str::to_string),
            completed_forms: BTreeSet::new(),
            form_data: BTreeMap::new(),
            navigation_state,
            validation_errors: BTreeMap::new(),
            created_at: now,
            last_modified: now,
        }
    }

    /// Point the session at `step`; `total_steps` means every form is done
    pub fn go_to_step(&mut self, step: usize) {
        self.navigation_state.current_step = step;
        self.current_form = self
            .navigation_state
            .current_template()
            .map(str::to_string);
    }

    /// Record a finished template and move to the step after it
    pub fn complete(&mut self, template: &str, answers: Answers) {
        self.completed_forms.insert(template.to_string());
        self.form_data.insert(template.to_string(), answers);
        self.validation_errors.remove(template);

        let step = match self.navigation_state.index_of(template) {
            Some(index) => (index + 1).min(self.navigation_state.total_steps),
            None => self.navigation_state.current_step,
        };
        self.go_to_step(step);
    }

    /// Answers of completed templates only
    pub fn completed_data(&self) -> BTreeMap<String, Answers> {
        self.form_data
            .iter()
            .filter(|(template, _)| self.completed_forms.contains(*template))
            .map(|(template, answers)| (template.clone(), answers.clone()))
            .collect()
    }
}

impl Record for FormSession {
    type Key = String;

    fn key(&self) -> String {
        self.case_id.clone()
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_modified = now;
    }
}

/// Cached data and validation state for one page of a multi-page form.
///
/// Keyed by (case, form, page), so two cases never share a page row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormPage {
    pub case_id: String,
    pub form_id: String,
    pub page_name: String,
    #[serde(default)]
    pub data: Answers,
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub validation_errors: Vec<String>,
    pub last_modified: DateTime<Utc>,
}

impl FormPage {
    pub fn key_for(case_id: &str, form_id: &str, page_name: &str) -> (String, String, String) {
        (
            case_id.to_string(),
            form_id.to_string(),
            page_name.to_string(),
        )
    }
}

impl Record for FormPage {
    type Key = (String, String, String);

    fn key(&self) -> Self::Key {
        Self::key_for(&self.case_id, &self.form_id, &self.page_name)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_modified = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sequence() -> Vec<String> {
        vec![
            "Demographic Details".to_string(),
            "Medical History".to_string(),
            "ECG".to_string(),
        ]
    }

    fn answers(value: Value) -> Answers {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_new_session_points_at_first_form() {
        let session = FormSession::new("case-1", "VOL-1", "STUDY-9", sequence());
        assert_eq!(session.navigation_state.current_step, 0);
        assert_eq!(session.navigation_state.total_steps, 3);
        assert_eq!(session.current_form.as_deref(), Some("Demographic Details"));
    }

    #[test]
    fn test_complete_advances_to_following_step() {
        let mut session = FormSession::new("case-1", "VOL-1", "STUDY-9", sequence());
        session.complete("Demographic Details", answers(json!({"age": 31})));

        assert_eq!(session.navigation_state.current_step, 1);
        assert_eq!(session.current_form.as_deref(), Some("Medical History"));
        assert!(session.completed_forms.contains("Demographic Details"));
    }

    #[test]
    fn test_complete_last_step_is_one_past_end() {
        let mut session = FormSession::new("case-1", "VOL-1", "STUDY-9", sequence());
        session.complete("ECG", answers(json!({"rate": 72})));

        assert_eq!(session.navigation_state.current_step, 3);
        assert!(session.navigation_state.is_finished());
        assert_eq!(session.current_form, None);
    }

    #[test]
    fn test_completed_forms_never_shrink() {
        let mut session = FormSession::new("case-1", "VOL-1", "STUDY-9", sequence());
        session.complete("Medical History", Answers::new());
        session.complete("Demographic Details", Answers::new());
        session.complete("Medical History", answers(json!({"asthma": "no"})));
        assert_eq!(session.completed_forms.len(), 2);
    }

    #[test]
    fn test_completed_data_excludes_drafts() {
        let mut session = FormSession::new("case-1", "VOL-1", "STUDY-9", sequence());
        session
            .form_data
            .insert("ECG".to_string(), answers(json!({"draft": true})));
        session.complete("Demographic Details", answers(json!({"age": 40})));

        let data = session.completed_data();
        assert_eq!(data.len(), 1);
        assert!(data.contains_key("Demographic Details"));
    }

    #[test]
    fn test_navigation_bounds() {
        let mut session = FormSession::new("case-1", "VOL-1", "STUDY-9", sequence());
        assert!(session.navigation_state.can_navigate_next());
        assert!(!session.navigation_state.can_navigate_previous());

        session.go_to_step(2);
        assert_eq!(session.current_form.as_deref(), Some("ECG"));
        assert!(!session.navigation_state.can_navigate_next());
        assert!(session.navigation_state.can_navigate_previous());

        let empty = NavigationState::new(Vec::new());
        assert!(!empty.can_navigate_next());
        assert!(!empty.can_navigate_previous());
    }

    #[test]
    fn test_page_key_includes_case() {
        let now = Utc::now();
        let page = |case: &str| FormPage {
            case_id: case.to_string(),
            form_id: "ecg".to_string(),
            page_name: "leads".to_string(),
            data: Answers::new(),
            is_valid: true,
            validation_errors: Vec::new(),
            last_modified: now,
        };
        assert_ne!(page("case-1").key(), page("case-2").key());
        // separators inside names cannot collide
        assert_ne!(
            FormPage::key_for("c", "a_b", "c"),
            FormPage::key_for("c", "a", "b_c")
        );
    }

    #[test]
    fn test_pending_form_accepts_patient_id_alias() {
        let raw = json!({
            "id": 4,
            "template_id": "ECG",
            "patient_id": "case-7",
            "answers": {"rate": 60},
            "created_at": "2024-05-01T10:00:00Z",
            "last_modified": "2024-05-01T10:00:00Z"
        });
        let form: PendingForm = serde_json::from_value(raw).unwrap();
        assert_eq!(form.case_id, "case-7");
        assert!(!form.synced);
    }
}
