//! Screening flow: case context carried in the query string, template
//! routes, and save-then-navigate between forms.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use utoipa::ToSchema;

use crate::config::FlowConfig;
use crate::stepper::FormStepper;
use crate::store::{Answers, LocalStore, PendingForm, StoreError};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\-]").unwrap());

/// Identifier that must be present before forms can be submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifier {
    Case,
    Volunteer,
    StudyNumber,
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Identifier::Case => "case id",
            Identifier::Volunteer => "volunteer id",
            Identifier::StudyNumber => "study number",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("missing {0}")]
    Missing(Identifier),

    #[error("'{0}' is not part of the form sequence")]
    UnknownForm(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Case, volunteer and study identifiers shared by every form of a case
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CaseContext {
    pub case_id: Option<String>,
    pub volunteer_id: Option<String>,
    pub study_number: Option<String>,
}

/// Identifiers that passed [`CaseContext::require_complete`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseIds<'a> {
    pub case_id: &'a str,
    pub volunteer_id: &'a str,
    pub study_number: &'a str,
}

impl CaseContext {
    pub fn new(
        case_id: impl Into<String>,
        volunteer_id: impl Into<String>,
        study_number: impl Into<String>,
    ) -> Self {
        Self {
            case_id: Some(case_id.into()),
            volunteer_id: Some(volunteer_id.into()),
            study_number: Some(study_number.into()),
        }
    }

    /// Read `case`, `volunteerId` and `studyNumber` from a query string
    pub fn from_query(search: &str) -> Self {
        let mut context = Self::default();
        let Some(url) = query_url(search) else {
            return context;
        };

        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned()).filter(|v| !v.is_empty());
            match key.as_ref() {
                "case" => context.case_id = value,
                "volunteerId" => context.volunteer_id = value,
                "studyNumber" => context.study_number = value,
                _ => {}
            }
        }
        context
    }

    /// Query string (without `?`) carrying the present identifiers
    pub fn to_query(&self) -> String {
        let Some(mut url) = query_url("") else {
            return String::new();
        };
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(case_id) = &self.case_id {
                pairs.append_pair("case", case_id);
            }
            if let Some(volunteer_id) = &self.volunteer_id {
                pairs.append_pair("volunteerId", volunteer_id);
            }
            if let Some(study_number) = &self.study_number {
                pairs.append_pair("studyNumber", study_number);
            }
        }
        url.query().unwrap_or_default().to_string()
    }

    pub fn require_case(&self) -> Result<&str, FlowError> {
        non_empty(self.case_id.as_deref()).ok_or(FlowError::Missing(Identifier::Case))
    }

    /// All three identifiers, or the first one missing
    pub fn require_complete(&self) -> Result<CaseIds<'_>, FlowError> {
        Ok(CaseIds {
            case_id: self.require_case()?,
            volunteer_id: non_empty(self.volunteer_id.as_deref())
                .ok_or(FlowError::Missing(Identifier::Volunteer))?,
            study_number: non_empty(self.study_number.as_deref())
                .ok_or(FlowError::Missing(Identifier::StudyNumber))?,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn query_url(search: &str) -> Option<Url> {
    let query = search.trim_start_matches('?');
    Url::parse(&format!("http://localhost/?{}", query)).ok()
}

/// Route slug for a template title: "X-Ray Evaluation" -> "x-ray-evaluation"
pub fn slugify(title: &str) -> String {
    let dashed = WHITESPACE.replace_all(title.trim(), "-").to_lowercase();
    NON_SLUG.replace_all(&dashed, "").into_owned()
}

/// Direction of a step move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Previous,
    Next,
}

/// Ordered screening forms and the routes that show them
#[derive(Debug, Clone)]
pub struct FormFlow {
    sequence: Vec<String>,
    route_prefix: String,
}

impl FormFlow {
    pub fn new(sequence: Vec<String>, route_prefix: impl Into<String>) -> Self {
        Self {
            sequence,
            route_prefix: route_prefix.into(),
        }
    }

    pub fn from_config(config: &FlowConfig) -> Self {
        Self::new(config.form_sequence.clone(), config.route_prefix.clone())
    }

    pub fn sequence(&self) -> &[String] {
        &self.sequence
    }

    /// Route tails for the stepper: last prefix segment plus the slug,
    /// e.g. `screening/medical-history`
    pub fn route_tails(&self) -> Vec<String> {
        let section = self
            .route_prefix
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();

        self.sequence
            .iter()
            .map(|title| {
                if section.is_empty() || section.contains('{') {
                    slugify(title)
                } else {
                    format!("{}/{}", section, slugify(title))
                }
            })
            .collect()
    }

    pub fn stepper(&self) -> FormStepper {
        FormStepper::new(self.route_tails())
    }

    /// Position of a template title, compared case-insensitively
    pub fn section_index(&self, title: &str) -> Option<usize> {
        self.sequence
            .iter()
            .position(|t| t.eq_ignore_ascii_case(title))
    }

    pub fn is_first(&self, title: &str) -> bool {
        self.section_index(title) == Some(0)
    }

    pub fn is_last(&self, title: &str) -> bool {
        self.section_index(title)
            .is_some_and(|i| i + 1 == self.sequence.len())
    }

    /// Title of the form before or after `title`
    pub fn neighbour(&self, title: &str, direction: Direction) -> Option<&str> {
        let index = self.section_index(title)?;
        let target = match direction {
            Direction::Previous => index.checked_sub(1)?,
            Direction::Next => index + 1,
        };
        self.sequence.get(target).map(String::as_str)
    }

    /// Full route for a template, carrying the case context
    pub fn route_for(&self, project: &str, title: &str, context: &CaseContext) -> String {
        let prefix = self.route_prefix.replace("{project}", project);
        let query = context.to_query();
        if query.is_empty() {
            format!("{}{}", prefix, slugify(title))
        } else {
            format!("{}{}?{}", prefix, slugify(title), query)
        }
    }

    /// Save the answers for `title`, then return the route of the neighbouring
    /// form. `None` when there is no form in that direction.
    pub fn save_and_navigate(
        &self,
        store: &mut LocalStore,
        project: &str,
        context: &CaseContext,
        title: &str,
        answers: Answers,
        direction: Direction,
    ) -> Result<(PendingForm, Option<String>), FlowError> {
        if self.section_index(title).is_none() {
            return Err(FlowError::UnknownForm(title.to_string()));
        }
        let case_id = context.require_case()?;

        let saved = store.save_answers(
            title,
            case_id,
            answers,
            context.volunteer_id.clone(),
            context.study_number.clone(),
        )?;

        let target = self
            .neighbour(title, direction)
            .map(|next| self.route_for(project, next, context));
        debug!(case_id, title, ?direction, target = ?target, "Saved and navigating");
        Ok((saved, target))
    }
}
