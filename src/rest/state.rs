//! API state management for the REST server.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::flow::FormFlow;
use crate::store::LocalStore;
use crate::submission::SubmissionQueue;

/// Shared state for the REST API
#[derive(Clone)]
pub struct ApiState {
    /// Local store; one writer at a time, held across a whole submission
    pub store: Arc<Mutex<LocalStore>>,
    pub config: Arc<Config>,
    pub flow: Arc<FormFlow>,
    pub queue: Arc<SubmissionQueue>,
}

impl ApiState {
    pub fn new(config: Config, store: LocalStore, queue: SubmissionQueue) -> Self {
        let flow = FormFlow::from_config(&config.flow);
        Self {
            store: Arc::new(Mutex::new(store)),
            config: Arc::new(config),
            flow: Arc::new(flow),
            queue: Arc::new(queue),
        }
    }

    /// Open the configured store and build the backends from config
    pub fn from_config(config: Config) -> Result<Self> {
        let store = LocalStore::open(config.store_path())
            .with_context(|| format!("Failed to open store at {}", config.store_path().display()))?;
        let queue = SubmissionQueue::from_config(&config).context("Failed to set up backends")?;
        Ok(Self::new(config, store, queue))
    }
}


#[cfg(test)]
impl ApiState {
    /// State over an in-memory store with default backends
    pub(crate) fn in_memory() -> Self {
        let config = Config::default();
        let queue = SubmissionQueue::from_config(&config).unwrap();
        Self::new(config, LocalStore::in_memory(), queue)
    }
}
