//! # Continuation Triggers
//!
//! The runner never re-invokes itself directly. It hands a `TriggerPayload` to
//! a `ContinuationTrigger`, which schedules a fresh invocation of the named job.
//! Dispatch is fire-and-forget: the trigger's only result is whether the
//! hand-off was accepted.
//!
//! ```rust
//! use call_ingest::job::{ContinuationTrigger, RecordingTrigger, TriggerPayload};
//!
//! # tokio_test::block_on(async {
//! let trigger = RecordingTrigger::new();
//! let payload = TriggerPayload {
//!     resume_index: Some(4200),
//!     ..TriggerPayload::default()
//! };
//! trigger.invoke_async("process-velocify-data", &payload).await.unwrap();
//!
//! let captured = trigger.take();
//! assert_eq!(captured[0].payload.resume_index, Some(4200));
//! # });
//! ```

use super::checkpoint::TriggerPayload;
use crate::error::{IngestError, IngestResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A scheduled continuation: which job to run and with what payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    pub job: String,
    pub payload: TriggerPayload,
}

/// Schedules a new invocation of a job
#[async_trait]
pub trait ContinuationTrigger: Send + Sync {
    async fn invoke_async(&self, job: &str, payload: &TriggerPayload) -> IngestResult<()>;
}

/// Dispatches continuations to an HTTP invoke endpoint (`POST {base}/{job}`)
///
/// The endpoint is expected to queue the invocation and answer immediately
/// (asynchronous "event" invocation), so only the acceptance status is checked.
pub struct HttpInvokeTrigger {
    client: reqwest::Client,
    invoke_url: String,
    function_prefix: String,
}

impl HttpInvokeTrigger {
    pub fn new(client: reqwest::Client, invoke_url: impl Into<String>) -> Self {
        Self {
            client,
            invoke_url: invoke_url.into(),
            function_prefix: String::new(),
        }
    }

    /// Prefix prepended to job names to form the deployed function name
    pub fn with_function_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.function_prefix = prefix.into();
        self
    }

    fn endpoint(&self, job: &str) -> String {
        format!(
            "{}/{}{}",
            self.invoke_url.trim_end_matches('/'),
            self.function_prefix,
            job
        )
    }
}

#[async_trait]
impl ContinuationTrigger for HttpInvokeTrigger {
    async fn invoke_async(&self, job: &str, payload: &TriggerPayload) -> IngestResult<()> {
        let endpoint = self.endpoint(job);
        debug!(job = %job, endpoint = %endpoint, "Dispatching continuation");

        let response = self
            .client
            .post(&endpoint)
            .header("X-Invocation-Type", "Event")
            .json(payload)
            .send()
            .await
            .map_err(|e| IngestError::trigger(job, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::trigger(job, format!("status {status}: {body}")));
        }

        info!(job = %job, "Continuation accepted");
        Ok(())
    }
}

/// Sends continuations into an in-process channel (local chain driver)
pub struct ChannelTrigger {
    sender: mpsc::UnboundedSender<Continuation>,
}

impl ChannelTrigger {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Continuation>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ContinuationTrigger for ChannelTrigger {
    async fn invoke_async(&self, job: &str, payload: &TriggerPayload) -> IngestResult<()> {
        self.sender
            .send(Continuation {
                job: job.to_string(),
                payload: payload.clone(),
            })
            .map_err(|_| IngestError::trigger(job, "continuation channel closed"))
    }
}

/// Captures continuations instead of dispatching them
#[derive(Default)]
pub struct RecordingTrigger {
    captured: Mutex<Vec<Continuation>>,
    reject: bool,
}

impl RecordingTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A trigger that records and then reports every dispatch as failed
    pub fn rejecting() -> Self {
        Self {
            captured: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn captured(&self) -> Vec<Continuation> {
        self.captured.lock().clone()
    }

    pub fn take(&self) -> Vec<Continuation> {
        std::mem::take(&mut *self.captured.lock())
    }
}

#[async_trait]
impl ContinuationTrigger for RecordingTrigger {
    async fn invoke_async(&self, job: &str, payload: &TriggerPayload) -> IngestResult<()> {
        self.captured.lock().push(Continuation {
            job: job.to_string(),
            payload: payload.clone(),
        });

        if self.reject {
            return Err(IngestError::trigger(job, "dispatch rejected"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> TriggerPayload {
        TriggerPayload {
            resume_index: Some(3),
            source_key: Some("calls.csv".to_string()),
            ..TriggerPayload::default()
        }
    }

    #[tokio::test]
    async fn test_recording_trigger_captures() {
        let trigger = RecordingTrigger::new();
        trigger.invoke_async("sweep", &payload()).await.unwrap();

        let captured = trigger.take();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].job, "sweep");
        assert!(trigger.captured().is_empty());
    }

    #[tokio::test]
    async fn test_channel_trigger_delivers() {
        let (trigger, mut receiver) = ChannelTrigger::new();
        trigger.invoke_async("sweep", &payload()).await.unwrap();

        let continuation = receiver.recv().await.unwrap();
        assert_eq!(continuation.payload.resume_index, Some(3));

        drop(receiver);
        assert!(trigger.invoke_async("sweep", &payload()).await.is_err());
    }

    #[tokio::test]
    async fn test_http_trigger_posts_payload() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/invoke/ingest-sweep"))
            .and(header("X-Invocation-Type", "Event"))
            .and(body_json(serde_json::json!({"resumeIndex": 3, "sourceKey": "calls.csv"})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&mock_server)
            .await;

        let trigger = HttpInvokeTrigger::new(reqwest::Client::new(), format!("{}/invoke/", mock_server.uri()))
            .with_function_prefix("ingest-");
        trigger.invoke_async("sweep", &payload()).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_trigger_reports_rejection() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&mock_server)
            .await;

        let trigger = HttpInvokeTrigger::new(reqwest::Client::new(), mock_server.uri());
        let err = trigger.invoke_async("sweep", &payload()).await.unwrap_err();
        assert!(matches!(err, IngestError::Trigger { .. }));
        assert!(err.to_string().contains("403"));
    }
}
