use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result of one record's submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ItemOutcome {
    pub pending_id: u64,
    pub template_id: String,
    pub case_id: String,
    /// Backend that accepted the record, `None` when every backend failed
    pub backend: Option<String>,
    pub remote_id: Option<String>,
    /// One message per failed backend attempt
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ItemOutcome {
    pub fn succeeded(&self) -> bool {
        self.backend.is_some()
    }
}

/// Overall result of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    NothingToSubmit,
    AllSucceeded,
    Partial { succeeded: usize, total: usize },
    AllFailed,
}

/// Counts and per-record outcomes of a submission batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SubmissionReport {
    /// Records attempted
    pub total: usize,
    pub succeeded: usize,
    /// Records left out because they were already synced
    pub skipped: usize,
    pub items: Vec<ItemOutcome>,
}

impl SubmissionReport {
    pub(crate) fn record(&mut self, item: ItemOutcome) {
        self.total += 1;
        if item.succeeded() {
            self.succeeded += 1;
        }
        self.items.push(item);
    }

    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }

    pub fn outcome(&self) -> SubmissionOutcome {
        match (self.succeeded, self.total) {
            (_, 0) => SubmissionOutcome::NothingToSubmit,
            (s, t) if s == t => SubmissionOutcome::AllSucceeded,
            (0, _) => SubmissionOutcome::AllFailed,
            (succeeded, total) => SubmissionOutcome::Partial { succeeded, total },
        }
    }

    /// Status line shown to the user after a batch
    pub fn message(&self) -> String {
        match self.outcome() {
            SubmissionOutcome::NothingToSubmit => "No pending forms to submit.".to_string(),
            SubmissionOutcome::AllSucceeded => {
                "All completed forms submitted to server successfully.".to_string()
            }
            SubmissionOutcome::Partial { succeeded, total } => {
                format!("{}/{} forms submitted, some failed.", succeeded, total)
            }
            SubmissionOutcome::AllFailed => "No forms could be submitted.".to_string(),
        }
    }

    /// Error lines of failed records, `"<template>: <error>"`
    pub fn errors(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|i| !i.succeeded())
            .flat_map(|i| {
                i.errors
                    .iter()
                    .map(move |e| format!("{}: {}", i.template_id, e))
            })
            .collect()
    }
}
