//! Route handlers for the REST API.

pub mod forms;
pub mod health;
pub mod sessions;
pub mod stepper;
pub mod submission;
