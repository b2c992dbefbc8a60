//! Form stepper: previous/next navigation over an ordered list of route tails.
//!
//! Tails are partial routes such as `screening/medical-history`. The first
//! tail found inside the current path decides the position; everything in
//! front of it is kept as the base for the neighbouring routes, and the
//! query string is carried over unchanged.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Ordered list of step route tails
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormStepper {
    tails: Vec<String>,
}

/// Where a location sits within the step list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StepPosition {
    /// Matched step, `None` when no tail occurs in the path
    pub index: Option<usize>,
    /// Path text in front of the matched tail
    pub base: String,
    /// Query string including the leading `?`, or empty
    pub search: String,
    pub has_previous: bool,
    pub has_next: bool,
    pub is_last_form: bool,
    pub previous_path: Option<String>,
    pub next_path: Option<String>,
}

impl FormStepper {
    pub fn new<I, S>(tails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tails: tails.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tails(&self) -> &[String] {
        &self.tails
    }

    pub fn len(&self) -> usize {
        self.tails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tails.is_empty()
    }

    /// Resolve a full location (`path?query`)
    pub fn locate(&self, location: &str) -> StepPosition {
        let (pathname, search) = split_location(location);
        self.resolve(pathname, search)
    }

    /// Resolve a path and its query string
    pub fn resolve(&self, pathname: &str, search: &str) -> StepPosition {
        let search = normalize_search(search);

        let matched = self
            .tails
            .iter()
            .enumerate()
            .find_map(|(i, tail)| pathname.find(tail.as_str()).map(|pos| (i, pos)));

        let Some((index, pos)) = matched else {
            return StepPosition {
                index: None,
                base: String::new(),
                search,
                has_previous: false,
                has_next: false,
                is_last_form: false,
                previous_path: None,
                next_path: None,
            };
        };

        let base = pathname[..pos].to_string();
        let has_previous = index > 0;
        let has_next = index + 1 < self.tails.len();

        let target = |i: usize| format!("{}{}{}", base, self.tails[i], search);
        let previous_path = has_previous.then(|| target(index - 1));
        let next_path = has_next.then(|| target(index + 1));

        StepPosition {
            index: Some(index),
            is_last_form: index + 1 == self.tails.len(),
            base,
            search,
            has_previous,
            has_next,
            previous_path,
            next_path,
        }
    }

    /// Format progress like "a > [b] > c"
    pub fn format_progress(&self, position: &StepPosition) -> String {
        self.tails
            .iter()
            .enumerate()
            .map(|(i, tail)| {
                if Some(i) == position.index {
                    format!("[{}]", tail)
                } else {
                    tail.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" > ")
    }

    /// Share of steps before the current one
    pub fn percentage_complete(&self, position: &StepPosition) -> u8 {
        if self.tails.is_empty() {
            100
        } else {
            let index = position.index.unwrap_or(0);
            ((index as f32 / self.tails.len() as f32) * 100.0) as u8
        }
    }
}

/// Split `path?query` at the first `?`; the query keeps its `?`
fn split_location(location: &str) -> (&str, &str) {
    match location.find('?') {
        Some(pos) => (&location[..pos], &location[pos..]),
        None => (location, ""),
    }
}

fn normalize_search(search: &str) -> String {
    if search.is_empty() || search.starts_with('?') {
        search.to_string()
    } else {
        format!("?{}", search)
    }
}
