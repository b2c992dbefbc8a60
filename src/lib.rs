//! Clinical Capture - offline form-session core for clinical screening
//!
//! Caches form answers locally, tracks each case's progress through an
//! ordered form sequence, and pushes cached forms to the remote backends
//! when asked.

pub mod api;
pub mod config;
pub mod flow;
pub mod logging;
pub mod rest;
pub mod stepper;
pub mod store;
pub mod submission;
