//! Local store for offline form capture.
//!
//! Holds three tables (pending forms, form sessions, form pages) in one
//! JSON document under the state directory. Every mutating call persists
//! the document, so a crash loses at most the write in flight. A call whose
//! write fails leaves the in-memory document as it was before the call.

mod records;
mod table;

pub use records::{
    Answers, FormPage, FormSession, NavigationState, NewPendingForm, PendingForm, Record,
};
pub use table::Table;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised by the local store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to access store file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("pending form {0} not found")]
    PendingFormNotFound(u64),

    #[error("no form session for case '{0}'")]
    SessionNotFound(String),

    #[error("step {step} is out of range for case '{case_id}' ({len} forms)")]
    StepOutOfRange {
        case_id: String,
        step: usize,
        len: usize,
    },

    #[error("form '{template}' is not in the sequence of case '{case_id}'")]
    FormNotInSequence { case_id: String, template: String },
}

/// On-disk layout of the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    pending_forms: Table<PendingForm>,
    #[serde(default)]
    sessions: Table<FormSession>,
    #[serde(default)]
    pages: Table<FormPage>,
}

/// Counts of records removed by [`LocalStore::clear_session`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearSummary {
    pub sessions: usize,
    pub pages: usize,
    pub pending_forms: usize,
}

/// Offline store for pending forms, sessions and page state
#[derive(Debug)]
pub struct LocalStore {
    doc: StoreDocument,
    /// `None` for an in-memory store
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Open the store at `path`, creating parent directories as needed.
    ///
    /// A file that cannot be parsed is moved aside to `<name>.corrupt`
    /// and the store starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let doc = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            match serde_json::from_str::<StoreDocument>(&contents) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Store file unreadable, starting empty");
                    quarantine(&path);
                    StoreDocument::default()
                }
            }
        } else {
            StoreDocument::default()
        };

        let mut store = Self {
            doc,
            path: Some(path),
        };
        store.repair_next_id();
        debug!(
            pending = store.doc.pending_forms.len(),
            sessions = store.doc.sessions.len(),
            pages = store.doc.pages.len(),
            "Local store opened"
        );
        Ok(store)
    }

    /// A store that is never written to disk
    pub fn in_memory() -> Self {
        let mut store = Self {
            doc: StoreDocument::default(),
            path: None,
        };
        store.repair_next_id();
        store
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persist the whole document (temp file, then rename)
    pub fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let contents = serde_json::to_string_pretty(&self.doc)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Apply `change` to the document and persist it.
    ///
    /// On any error, including a failed write, the previous document is
    /// put back.
    fn commit<T, F>(&mut self, change: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut StoreDocument) -> Result<T, StoreError>,
    {
        let snapshot = self.doc.clone();
        let result = change(&mut self.doc).and_then(|value| self.save().map(|()| value));
        if result.is_err() {
            self.doc = snapshot;
        }
        result
    }

    /// Ids start at 1 and always stay above every stored id
    fn repair_next_id(&mut self) {
        let above_max = self.doc.pending_forms.last_key().map_or(1, |id| id + 1);
        self.doc.next_id = self.doc.next_id.max(above_max);
    }

    // ─── Raw tables ──────────────────────────────────────────────────────

    pub fn pending_forms(&self) -> &Table<PendingForm> {
        &self.doc.pending_forms
    }

    pub fn sessions(&self) -> &Table<FormSession> {
        &self.doc.sessions
    }

    pub fn pages(&self) -> &Table<FormPage> {
        &self.doc.pages
    }

    // ─── Pending forms ───────────────────────────────────────────────────

    pub fn add_pending_form(&mut self, new: NewPendingForm) -> Result<PendingForm, StoreError> {
        self.commit(|doc| {
            let id = doc.next_id;
            doc.next_id += 1;

            let now = Utc::now();
            let form = PendingForm {
                id,
                template_id: new.template_id,
                case_id: new.case_id,
                answers: new.answers,
                volunteer_id: new.volunteer_id,
                study_number: new.study_number,
                synced: false,
                created_at: now,
                last_modified: now,
            };
            doc.pending_forms.put(form.clone());
            Ok(form)
        })
    }

    pub fn update_pending_form<F>(&mut self, id: u64, change: F) -> Result<PendingForm, StoreError>
    where
        F: FnOnce(&mut PendingForm),
    {
        self.commit(|doc| {
            doc.pending_forms
                .update(&id, change)
                .cloned()
                .ok_or(StoreError::PendingFormNotFound(id))
        })
    }

    /// The pending form for (template, case), if one was saved
    pub fn find_pending_form(&self, template_id: &str, case_id: &str) -> Option<&PendingForm> {
        self.doc
            .pending_forms
            .find(|f| f.template_id == template_id && f.case_id == case_id)
    }

    /// Save answers for (template, case), updating the existing record in place.
    ///
    /// Edited answers have not reached a backend yet, so `synced` resets.
    pub fn save_answers(
        &mut self,
        template_id: &str,
        case_id: &str,
        answers: Answers,
        volunteer_id: Option<String>,
        study_number: Option<String>,
    ) -> Result<PendingForm, StoreError> {
        if let Some(existing) = self.find_pending_form(template_id, case_id) {
            let id = existing.id;
            debug!(id, template_id, case_id, "Updating saved answers");
            return self.update_pending_form(id, |form| {
                form.answers = answers;
                if volunteer_id.is_some() {
                    form.volunteer_id = volunteer_id;
                }
                if study_number.is_some() {
                    form.study_number = study_number;
                }
                form.synced = false;
            });
        }

        debug!(template_id, case_id, "Saving new answers");
        self.add_pending_form(NewPendingForm {
            template_id: template_id.to_string(),
            case_id: case_id.to_string(),
            answers,
            volunteer_id,
            study_number,
        })
    }

    pub fn load_answers(&self, template_id: &str, case_id: &str) -> Option<&Answers> {
        self.find_pending_form(template_id, case_id)
            .map(|f| &f.answers)
    }

    /// Pending forms for a case, narrowed to one volunteer when given
    pub fn pending_forms_for_case(
        &self,
        case_id: &str,
        volunteer_id: Option<&str>,
    ) -> Vec<PendingForm> {
        self.doc
            .pending_forms
            .query(|f| {
                f.case_id == case_id
                    && volunteer_id.map_or(true, |v| f.volunteer_id.as_deref() == Some(v))
            })
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn all_pending_forms(&self) -> Vec<PendingForm> {
        self.doc.pending_forms.iter().cloned().collect()
    }

    pub fn pending_forms_count(&self) -> usize {
        self.doc.pending_forms.len()
    }

    pub fn unsynced_forms(&self) -> Vec<PendingForm> {
        self.doc
            .pending_forms
            .query(|f| !f.synced)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn mark_synced(&mut self, id: u64) -> Result<(), StoreError> {
        self.update_pending_form(id, |form| form.synced = true)?;
        Ok(())
    }

    pub fn delete_pending_form(&mut self, id: u64) -> Result<PendingForm, StoreError> {
        self.commit(|doc| {
            doc.pending_forms
                .delete(&id)
                .ok_or(StoreError::PendingFormNotFound(id))
        })
    }

    // ─── Form sessions ───────────────────────────────────────────────────

    /// Start (or restart) the session for a case
    pub fn start_session(
        &mut self,
        case_id: &str,
        volunteer_id: &str,
        study_number: &str,
        form_sequence: Vec<String>,
    ) -> Result<FormSession, StoreError> {
        let session = FormSession::new(case_id, volunteer_id, study_number, form_sequence);
        let replaced = self.commit(|doc| Ok(doc.sessions.put(session.clone()).is_some()))?;
        if replaced {
            info!(case_id, "Replaced existing form session");
        } else {
            info!(case_id, "Started form session");
        }
        Ok(session)
    }

    pub fn session(&self, case_id: &str) -> Option<&FormSession> {
        self.doc.sessions.get(&case_id.to_string())
    }

    fn require_session(&self, case_id: &str) -> Result<&FormSession, StoreError> {
        self.session(case_id)
            .ok_or_else(|| StoreError::SessionNotFound(case_id.to_string()))
    }

    fn update_session<F>(&mut self, case_id: &str, change: F) -> Result<FormSession, StoreError>
    where
        F: FnOnce(&mut FormSession),
    {
        self.commit(|doc| {
            doc.sessions
                .update(&case_id.to_string(), change)
                .cloned()
                .ok_or_else(|| StoreError::SessionNotFound(case_id.to_string()))
        })
    }

    /// Mark a template complete and advance the session past it
    pub fn complete_form(
        &mut self,
        case_id: &str,
        template_id: &str,
        answers: Answers,
    ) -> Result<FormSession, StoreError> {
        let session = self.update_session(case_id, |s| s.complete(template_id, answers))?;
        info!(
            case_id,
            template_id,
            completed = session.completed_forms.len(),
            total = session.navigation_state.total_steps,
            "Form completed"
        );
        Ok(session)
    }

    /// Move a session to `step`; one past the last form is allowed
    pub fn set_current_step(&mut self, case_id: &str, step: usize) -> Result<FormSession, StoreError> {
        let len = self
            .require_session(case_id)?
            .navigation_state
            .form_sequence
            .len();
        if step > len {
            return Err(StoreError::StepOutOfRange {
                case_id: case_id.to_string(),
                step,
                len,
            });
        }

        self.update_session(case_id, |s| s.go_to_step(step))
    }

    /// Move to the following form. `None` when the session is already on
    /// its last form (or past it) and nothing changed.
    pub fn go_to_next(&mut self, case_id: &str) -> Result<Option<FormSession>, StoreError> {
        let nav = &self.require_session(case_id)?.navigation_state;
        let step = nav.can_navigate_next().then(|| nav.current_step + 1);
        match step {
            Some(step) => self.set_current_step(case_id, step).map(Some),
            None => Ok(None),
        }
    }

    /// Move to the preceding form; `None` on the first form
    pub fn go_to_previous(&mut self, case_id: &str) -> Result<Option<FormSession>, StoreError> {
        let nav = &self.require_session(case_id)?.navigation_state;
        let step = nav.can_navigate_previous().then(|| nav.current_step - 1);
        match step {
            Some(step) => self.set_current_step(case_id, step).map(Some),
            None => Ok(None),
        }
    }

    /// Jump to a template of the session's sequence by name
    pub fn go_to_form(&mut self, case_id: &str, template: &str) -> Result<FormSession, StoreError> {
        let step = self
            .require_session(case_id)?
            .navigation_state
            .index_of(template)
            .ok_or_else(|| StoreError::FormNotInSequence {
                case_id: case_id.to_string(),
                template: template.to_string(),
            })?;
        debug!(case_id, template, step, "Navigating to form");
        self.set_current_step(case_id, step)
    }

    pub fn set_validation_errors(
        &mut self,
        case_id: &str,
        template_id: &str,
        errors: Vec<String>,
    ) -> Result<FormSession, StoreError> {
        self.update_session(case_id, |s| {
            if errors.is_empty() {
                s.validation_errors.remove(template_id);
            } else {
                s.validation_errors.insert(template_id.to_string(), errors);
            }
        })
    }

    pub fn completed_forms_data(
        &self,
        case_id: &str,
    ) -> Result<BTreeMap<String, Answers>, StoreError> {
        self.require_session(case_id).map(FormSession::completed_data)
    }

    // ─── Form pages ──────────────────────────────────────────────────────

    pub fn save_page(
        &mut self,
        case_id: &str,
        form_id: &str,
        page_name: &str,
        data: Answers,
        is_valid: bool,
        validation_errors: Vec<String>,
    ) -> Result<FormPage, StoreError> {
        let page = FormPage {
            case_id: case_id.to_string(),
            form_id: form_id.to_string(),
            page_name: page_name.to_string(),
            data,
            is_valid,
            validation_errors,
            last_modified: Utc::now(),
        };
        self.commit(|doc| {
            doc.pages.put(page.clone());
            Ok(())
        })?;
        Ok(page)
    }

    pub fn page(&self, case_id: &str, form_id: &str, page_name: &str) -> Option<&FormPage> {
        self.doc
            .pages
            .get(&FormPage::key_for(case_id, form_id, page_name))
    }

    /// Pages of one form of one case, in page name order
    pub fn pages_for_form(&self, case_id: &str, form_id: &str) -> Vec<&FormPage> {
        self.doc
            .pages
            .query(|p| p.case_id == case_id && p.form_id == form_id)
    }

    // ─── Reset ───────────────────────────────────────────────────────────

    /// Remove the session, its pages and its pending forms
    pub fn clear_session(&mut self, case_id: &str) -> Result<ClearSummary, StoreError> {
        let summary = self.commit(|doc| {
            Ok(ClearSummary {
                sessions: usize::from(doc.sessions.delete(&case_id.to_string()).is_some()),
                pages: doc.pages.delete_where(|p| p.case_id == case_id),
                pending_forms: doc.pending_forms.delete_where(|f| f.case_id == case_id),
            })
        })?;
        info!(
            case_id,
            sessions = summary.sessions,
            pages = summary.pages,
            pending_forms = summary.pending_forms,
            "Cleared form session"
        );
        Ok(summary)
    }
}

/// Move an unreadable store file out of the way, keeping it for inspection
fn quarantine(path: &Path) {
    let target = path.with_extension("json.corrupt");
    if let Err(e) = fs::rename(path, &target) {
        warn!(path = %path.display(), error = %e, "Failed to move corrupt store file aside");
    }
}
