//! # Storage Sweep
//!
//! Deletes objects older than the retention window from a container. The
//! sequence is the container listing ordered by key; because deletes remove
//! items from that listing, continuations resume from a key rather than an
//! offset. The retention cutoff is fixed when the listing is fetched, so every
//! object of one invocation is judged against the same instant.

use crate::constants::storage::DEFAULT_RETENTION_DAYS;
use crate::error::IngestResult;
use crate::job::{ItemOutcome, ResumableJob, SourceContext, WorkBatch};
use crate::services::{list_all, ObjectStore, ObjectSummary};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSweepSettings {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Only keys ending with this suffix are considered
    #[serde(default)]
    pub key_suffix: Option<String>,
}

impl Default for StorageSweepSettings {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            key_suffix: None,
        }
    }
}

/// A listed object and the cutoff it is judged against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepCandidate {
    pub object: ObjectSummary,
    pub cutoff: DateTime<Utc>,
}

impl SweepCandidate {
    pub fn is_expired(&self) -> bool {
        self.object.last_modified < self.cutoff
    }
}

pub struct StorageSweepJob {
    name: String,
    store: Arc<dyn ObjectStore>,
    settings: StorageSweepSettings,
    clock: fn() -> DateTime<Utc>,
}

impl StorageSweepJob {
    pub fn new(name: impl Into<String>, store: Arc<dyn ObjectStore>, settings: StorageSweepSettings) -> Self {
        Self {
            name: name.into(),
            store,
            settings,
            clock: Utc::now,
        }
    }

    #[cfg(test)]
    fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    fn cutoff(&self) -> DateTime<Utc> {
        (self.clock)() - Duration::days(i64::from(self.settings.retention_days))
    }
}

#[async_trait]
impl ResumableJob for StorageSweepJob {
    type Item = SweepCandidate;

    fn name(&self) -> &str {
        &self.name
    }

    /// `cursor` is the first key still to visit
    async fn fetch_batch(&self, source: &SourceContext, cursor: Option<&str>) -> IngestResult<WorkBatch<SweepCandidate>> {
        let cutoff = self.cutoff();
        let candidates = list_all(self.store.as_ref(), source.require_container()?)
            .await?
            .into_iter()
            .filter(|object| cursor.map_or(true, |start| object.key.as_str() >= start))
            .filter(|object| {
                self.settings
                    .key_suffix
                    .as_deref()
                    .map_or(true, |suffix| object.key.ends_with(suffix))
            })
            .map(|object| SweepCandidate { object, cutoff })
            .collect();
        info!(cutoff = %cutoff, "Sweeping objects last modified before cutoff");
        Ok(WorkBatch::materialized(candidates))
    }

    async fn process_item(&self, source: &SourceContext, candidate: &SweepCandidate) -> IngestResult<ItemOutcome> {
        if !candidate.is_expired() {
            return Ok(ItemOutcome::Skipped("within retention".to_string()));
        }

        let object = &candidate.object;
        let container = source.require_container()?;
        self.store.delete(container, &object.key).await?;
        info!(container = %container, key = %object.key, last_modified = %object.last_modified, "Deleted expired object");
        Ok(ItemOutcome::Processed)
    }

    fn describe_item(&self, candidate: &SweepCandidate) -> String {
        candidate.object.key.clone()
    }

    fn resume_cursor(&self, candidate: &SweepCandidate) -> Option<String> {
        Some(candidate.object.key.clone())
    }
}
