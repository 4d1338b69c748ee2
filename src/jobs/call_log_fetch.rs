//! # Call-Log Fetch
//!
//! Walks a telephony provider's paginated call log. For every call the raw
//! record is stored as `{call_id}.json` in the info container, then the
//! recording (if any) is downloaded to `{call_id}.mp3` in the recordings
//! container after a fixed rate-limit delay.

use crate::constants::storage::{AUDIO_CONTENT_TYPE, JSON_CONTENT_TYPE};
use crate::constants::telephony::DEFAULT_PAGE_SIZE;
use crate::constants::timing::RECORDING_RATE_LIMIT_DELAY_MS;
use crate::error::IngestResult;
use crate::job::{ItemOutcome, ResumableJob, SourceContext, WorkBatch};
use crate::resilience::RetryPolicy;
use crate::services::ObjectStore;
use crate::telephony::TelephonyApi;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallLogFetchSettings {
    pub info_container: String,
    pub recordings_container: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_recording_delay_ms")]
    pub recording_delay_ms: u64,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_recording_delay_ms() -> u64 {
    RECORDING_RATE_LIMIT_DELAY_MS
}

/// A call record with the id it is stored under
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub id: String,
    pub body: Value,
}

pub struct CallLogFetchJob {
    name: String,
    api: Arc<dyn TelephonyApi>,
    store: Arc<dyn ObjectStore>,
    settings: CallLogFetchSettings,
    retry: RetryPolicy,
}

impl CallLogFetchJob {
    pub fn new(
        name: impl Into<String>,
        api: Arc<dyn TelephonyApi>,
        store: Arc<dyn ObjectStore>,
        settings: CallLogFetchSettings,
    ) -> Self {
        Self {
            name: name.into(),
            api,
            store,
            settings,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn settings(&self) -> &CallLogFetchSettings {
        &self.settings
    }
}

#[async_trait]
impl ResumableJob for CallLogFetchJob {
    type Item = CallRecord;

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_batch(&self, _source: &SourceContext, cursor: Option<&str>) -> IngestResult<WorkBatch<CallRecord>> {
        let page = self.api.list_calls(cursor, self.settings.page_size).await?;
        let records = page
            .records
            .into_iter()
            .map(|body| CallRecord {
                id: self
                    .api
                    .call_id(&body)
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                body,
            })
            .collect();

        Ok(WorkBatch::page(records, page.next_cursor))
    }

    async fn process_item(&self, _source: &SourceContext, call: &CallRecord) -> IngestResult<ItemOutcome> {
        let info = serde_json::to_vec(&call.body)?;
        self.store
            .put(
                &self.settings.info_container,
                &format!("{}.json", call.id),
                Bytes::from(info),
                JSON_CONTENT_TYPE,
            )
            .await?;

        let Some(location) = self.api.recording_location(&call.body) else {
            debug!(call_id = %call.id, "Call has no recording");
            return Ok(ItemOutcome::Processed);
        };

        tokio::time::sleep(Duration::from_millis(self.settings.recording_delay_ms)).await;
        let audio = self
            .retry
            .run(&location, || self.api.download(&location))
            .await?;

        self.store
            .put(
                &self.settings.recordings_container,
                &format!("{}.mp3", call.id),
                audio,
                AUDIO_CONTENT_TYPE,
            )
            .await?;
        info!(call_id = %call.id, provider = %self.api.provider(), "Stored call recording");
        Ok(ItemOutcome::Processed)
    }

    fn describe_item(&self, call: &CallRecord) -> String {
        format!("call {}", call.id)
    }
}
