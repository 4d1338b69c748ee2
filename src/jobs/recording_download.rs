//! # Recording Download
//!
//! Materialized sequence of recordings to copy into object storage. The
//! sequence comes either from the rows of a CSV export (one recording URL per
//! row) or from call-log JSON objects already stored in a container.

use super::csv_source::{load_rows, CsvRow};
use crate::constants::storage::AUDIO_CONTENT_TYPE;
use crate::error::{IngestError, IngestResult};
use crate::job::{ItemOutcome, ResumableJob, SourceContext, WorkBatch};
use crate::resilience::RetryPolicy;
use crate::services::{list_all, ObjectStore};
use crate::telephony::RecordingDownloader;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn default_url_column() -> String {
    "Recording".to_string()
}

fn default_id_column() -> String {
    "Call Id".to_string()
}

fn default_recording_pointer() -> String {
    "/recording/contentUri".to_string()
}

/// Where the list of recordings comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum RecordingSource {
    /// Rows of the CSV object named by the source context
    CsvRows {
        #[serde(default = "default_url_column")]
        url_column: String,
        #[serde(default = "default_id_column")]
        id_column: String,
    },
    /// Every `.json` object in the source container
    CallLogObjects {
        #[serde(default = "default_recording_pointer")]
        recording_pointer: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingDownloadSettings {
    pub source: RecordingSource,
    pub target_container: String,
    /// Wait before each download
    #[serde(default)]
    pub item_delay_ms: u64,
}

#[derive(Debug, Clone)]
pub enum RecordingItem {
    Row(CsvRow),
    CallLogObject(String),
}

pub struct RecordingDownloadJob {
    name: String,
    store: Arc<dyn ObjectStore>,
    downloader: Arc<dyn RecordingDownloader>,
    settings: RecordingDownloadSettings,
    retry: RetryPolicy,
    downstream_job: Option<String>,
}

impl RecordingDownloadJob {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        downloader: Arc<dyn RecordingDownloader>,
        settings: RecordingDownloadSettings,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            downloader,
            settings,
            retry: RetryPolicy::none(),
            downstream_job: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Start `job` with the same source once per fresh chain
    pub fn with_downstream_job(mut self, job: Option<String>) -> Self {
        self.downstream_job = job;
        self
    }

    /// Resolve an item to `(call id, download location)`; `None` when it has no recording
    async fn resolve(&self, source: &SourceContext, item: &RecordingItem) -> IngestResult<Option<(String, String)>> {
        match (item, &self.settings.source) {
            (RecordingItem::Row(row), RecordingSource::CsvRows { url_column, id_column }) => {
                let Some(url) = row.get(url_column).filter(|url| url.starts_with("http")) else {
                    return Ok(None);
                };
                let call_id = row.get(id_column).unwrap_or("unknown");
                Ok(Some((call_id.to_string(), url.to_string())))
            }
            (RecordingItem::CallLogObject(key), RecordingSource::CallLogObjects { recording_pointer }) => {
                let body = self.store.get(source.require_container()?, key).await?;
                let call: Value = serde_json::from_slice(&body)?;

                let Some(location) = call.pointer(recording_pointer).and_then(Value::as_str) else {
                    return Ok(None);
                };
                let call_id = match call.get("id") {
                    Some(Value::String(id)) => id.clone(),
                    Some(Value::Number(id)) => id.to_string(),
                    _ => key.trim_end_matches(".json").to_string(),
                };
                Ok(Some((call_id, location.to_string())))
            }
            _ => Err(IngestError::item_processing(
                self.describe_item(item),
                "item does not match the configured recording source",
            )),
        }
    }
}

#[async_trait]
impl ResumableJob for RecordingDownloadJob {
    type Item = RecordingItem;

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_batch(&self, source: &SourceContext, _cursor: Option<&str>) -> IngestResult<WorkBatch<RecordingItem>> {
        let items = match &self.settings.source {
            RecordingSource::CsvRows { .. } => load_rows(self.store.as_ref(), source)
                .await?
                .into_iter()
                .map(RecordingItem::Row)
                .collect(),
            RecordingSource::CallLogObjects { .. } => list_all(self.store.as_ref(), source.require_container()?)
                .await?
                .into_iter()
                .filter(|object| object.key.ends_with(".json"))
                .map(|object| RecordingItem::CallLogObject(object.key))
                .collect(),
        };
        Ok(WorkBatch::materialized(items))
    }

    async fn process_item(&self, source: &SourceContext, item: &RecordingItem) -> IngestResult<ItemOutcome> {
        let Some((call_id, location)) = self.resolve(source, item).await? else {
            return Ok(ItemOutcome::Skipped("no recording".to_string()));
        };

        if self.settings.item_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settings.item_delay_ms)).await;
        }

        let audio = self
            .retry
            .run(&location, || self.downloader.download(&location))
            .await?;
        let target_key = format!("{call_id}.mp3");
        self.store
            .put(&self.settings.target_container, &target_key, audio, AUDIO_CONTENT_TYPE)
            .await?;

        info!(call_id = %call_id, target = %target_key, "Stored recording");
        Ok(ItemOutcome::Processed)
    }

    fn describe_item(&self, item: &RecordingItem) -> String {
        match item {
            RecordingItem::Row(row) => match &self.settings.source {
                RecordingSource::CsvRows { id_column, .. } => {
                    format!("row {}", row.get(id_column).unwrap_or("unknown"))
                }
                RecordingSource::CallLogObjects { .. } => "row".to_string(),
            },
            RecordingItem::CallLogObject(key) => format!("object {key}"),
        }
    }

    fn downstream_job(&self) -> Option<&str> {
        self.downstream_job.as_deref()
    }
}
