//! # Job Registry
//!
//! Name-keyed lookup of invocable jobs. Every deployed function resolves its
//! job here by name, and continuation payloads are routed back through the
//! same name.
//!
//! ## Architecture
//!
//! ```text
//! IngestConfig ──▶ JobFactory ──▶ JobRegistry ──▶ InvocationHandler
//!                  (builds clients,  (name ─▶ Arc<dyn InvocableJob>)
//!                   binds runners)
//! ```

pub mod factory;

pub use factory::JobFactory;

use crate::error::{IngestError, IngestResult};
use crate::job::InvocableJob;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Registered jobs, keyed by job name
#[derive(Default, Clone)]
pub struct JobRegistry {
    jobs: BTreeMap<String, Arc<dyn InvocableJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job under its own name, replacing any earlier registration
    pub fn register(&mut self, job: Arc<dyn InvocableJob>) {
        let name = job.name().to_string();
        debug!(job = %name, "Registering job");
        self.jobs.insert(name, job);
    }

    pub fn get(&self, name: &str) -> IngestResult<Arc<dyn InvocableJob>> {
        self.jobs
            .get(name)
            .cloned()
            .ok_or_else(|| IngestError::configuration("registry", format!("unknown job '{name}'")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.jobs.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry").field("jobs", &self.names()).finish()
    }
}
