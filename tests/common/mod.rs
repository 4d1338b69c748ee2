//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use call_ingest::error::{IngestError, IngestResult};
use call_ingest::handler::ServiceHandles;
use call_ingest::job::{ContinuationTrigger, ItemOutcome, ResumableJob, SourceContext, WorkBatch};
use call_ingest::services::{InMemoryObjectStore, RecordingWarehouse, StaticSecretStore, WarehouseClient};
use call_ingest::telephony::RecordingDownloader;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub const VELOCIFY_HEADER: &str = "Call Id,Lead Id,User,Origin,Time,Call Duration (hrs:min:sec),Recording";

/// A Velocify-style export with `rows` calls, each with a recording under `recording_base`
pub fn velocify_csv(rows: usize, recording_base: &str) -> Bytes {
    let mut body = String::from(VELOCIFY_HEADER);
    body.push('\n');
    for i in 0..rows {
        body.push_str(&format!(
            "C{i},{lead},\"Doe, Jane\",Outbound,2024-03-01 10:{min:02}:00,0:01:{sec:02},{recording_base}/rec/{i}.mp3\n",
            lead = 1000 + i,
            min = i % 60,
            sec = i % 60,
        ));
    }
    Bytes::from(body)
}

/// Downloader that takes a fixed amount of (virtual) time per recording
pub struct TimedDownloader {
    cost: Duration,
    fail_containing: Option<String>,
    pub downloaded: Mutex<Vec<String>>,
}

impl TimedDownloader {
    pub fn new(cost: Duration) -> Self {
        Self {
            cost,
            fail_containing: None,
            downloaded: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, fragment: &str) -> Self {
        self.fail_containing = Some(fragment.to_string());
        self
    }

    pub fn count(&self) -> usize {
        self.downloaded.lock().len()
    }
}

#[async_trait]
impl RecordingDownloader for TimedDownloader {
    async fn download(&self, location: &str) -> IngestResult<Bytes> {
        tokio::time::sleep(self.cost).await;
        if let Some(fragment) = &self.fail_containing {
            if location.contains(fragment.as_str()) {
                return Err(IngestError::upstream_fetch(location, Some(404), "not found"));
            }
        }
        self.downloaded.lock().push(location.to_string());
        Ok(Bytes::from(format!("audio:{location}")))
    }
}

/// Sequence of `len` integers, optionally split into pages addressed by a
/// numeric cursor; every item takes `cost` and is recorded in `seen`
pub struct SequenceJob {
    pub len: usize,
    pub page_size: Option<usize>,
    pub cost: Duration,
    pub seen: Arc<Mutex<Vec<usize>>>,
}

impl SequenceJob {
    pub fn new(len: usize, page_size: Option<usize>, cost: Duration) -> Self {
        Self {
            len,
            page_size,
            cost,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ResumableJob for SequenceJob {
    type Item = usize;

    fn name(&self) -> &str {
        "sequence"
    }

    async fn fetch_batch(&self, _source: &SourceContext, cursor: Option<&str>) -> IngestResult<WorkBatch<usize>> {
        let Some(page_size) = self.page_size else {
            return Ok(WorkBatch::materialized((0..self.len).collect()));
        };

        let page: usize = match cursor {
            Some(raw) => raw
                .parse()
                .map_err(|_| IngestError::malformed_input("cursor", raw.to_string()))?,
            None => 0,
        };
        let start = page * page_size;
        let end = (start + page_size).min(self.len);
        let next = (end < self.len).then(|| (page + 1).to_string());
        Ok(WorkBatch::page((start..end).collect(), next))
    }

    async fn process_item(&self, _source: &SourceContext, item: &usize) -> IngestResult<ItemOutcome> {
        tokio::time::sleep(self.cost).await;
        self.seen.lock().push(*item);
        Ok(ItemOutcome::Processed)
    }
}

/// Handles backed entirely by in-process realizations
pub struct MemoryServices {
    pub handles: ServiceHandles,
    pub store: Arc<InMemoryObjectStore>,
    pub warehouse: Arc<RecordingWarehouse>,
}

pub fn memory_services(trigger: Arc<dyn ContinuationTrigger>, secrets: StaticSecretStore) -> MemoryServices {
    memory_services_with(trigger, secrets, RecordingWarehouse::new())
}

pub fn memory_services_with(
    trigger: Arc<dyn ContinuationTrigger>,
    secrets: StaticSecretStore,
    warehouse: RecordingWarehouse,
) -> MemoryServices {
    let store = Arc::new(InMemoryObjectStore::new());
    let warehouse = Arc::new(warehouse);
    let handles = ServiceHandles {
        store: store.clone(),
        secrets: Arc::new(secrets),
        warehouse: Arc::new(WarehouseClient::new(warehouse.clone()).with_polling(Duration::from_millis(1), 10)),
        http_client: reqwest::Client::new(),
        trigger,
    };

    MemoryServices {
        handles,
        store,
        warehouse,
    }
}
