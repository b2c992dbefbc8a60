//! Offline submission queue.
//!
//! Pushes locally stored forms to the primary API one at a time, falls back
//! to the secondary store when the primary refuses a record, and marks each
//! accepted record synced. No retries: a failed record stays unsynced for
//! the next attempt.
//!
//! A whole session can also go to the primary API in one bulk request; the
//! case's local records are cleared once the API reports success.

mod queue;
mod report;

pub use queue::SubmissionQueue;
pub use report::{ItemOutcome, SubmissionOutcome, SubmissionReport};

use thiserror::Error;

use crate::api::ApiError;
use crate::flow::FlowError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum SubmissionError {
    /// Identifiers missing; no backend was contacted
    #[error("cannot submit: {0}")]
    Validation(#[from] FlowError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no completed forms to submit for case '{0}'")]
    NothingCompleted(String),

    #[error(transparent)]
    Remote(#[from] ApiError),
}
