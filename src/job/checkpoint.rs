//! # Checkpoints and Trigger Payloads
//!
//! A checkpoint is the minimal state a continuation invocation needs to pick a
//! chain back up: where to resume in the work sequence, and which source object
//! the sequence is rebuilt from.
//!
//! ## Resume position
//!
//! One position type covers both sequence realizations:
//!
//! - **Materialized** (rows of a CSV object, objects of a listing): `cursor` is
//!   `None` and `index` is the offset of the next unprocessed item.
//! - **Paginated** (remote API pages): `cursor` is the token that fetched the
//!   batch being worked on (`None` for the first batch) and `index` is the
//!   offset of the next unprocessed item inside that batch.

use crate::constants::payload_keys;
use crate::error::{IngestError, IngestResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Position of the next unprocessed work item
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResumePosition {
    pub cursor: Option<String>,
    pub index: usize,
}

impl ResumePosition {
    /// Fresh start: first batch, first item
    pub fn start() -> Self {
        Self::default()
    }

    /// Position inside a materialized sequence
    pub fn at_index(index: usize) -> Self {
        Self { cursor: None, index }
    }

    /// Position inside the batch fetched with `cursor`
    pub fn at_cursor(cursor: impl Into<String>, index: usize) -> Self {
        Self {
            cursor: Some(cursor.into()),
            index,
        }
    }

    pub fn is_start(&self) -> bool {
        self.cursor.is_none() && self.index == 0
    }
}

impl fmt::Display for ResumePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cursor {
            Some(cursor) => write!(f, "cursor {cursor} at offset {}", self.index),
            None => write!(f, "index {}", self.index),
        }
    }
}

/// Identifying context needed to rebuild the work sequence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_container: Option<String>,
}

impl SourceContext {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            source_key: Some(key.into()),
            source_container: Some(container.into()),
        }
    }

    /// Fill missing fields from configured defaults
    pub fn with_defaults(mut self, container: Option<&str>, key: Option<&str>) -> Self {
        if self.source_container.is_none() {
            self.source_container = container.map(str::to_string);
        }
        if self.source_key.is_none() {
            self.source_key = key.map(str::to_string);
        }
        self
    }

    pub fn require_key(&self) -> IngestResult<&str> {
        self.source_key
            .as_deref()
            .ok_or_else(|| IngestError::configuration("source", format!("missing {}", payload_keys::SOURCE_KEY)))
    }

    pub fn require_container(&self) -> IngestResult<&str> {
        self.source_container.as_deref().ok_or_else(|| {
            IngestError::configuration("source", format!("missing {}", payload_keys::SOURCE_CONTAINER))
        })
    }
}

/// Immutable record emitted when an invocation stops to hand off its chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub job: String,
    pub position: ResumePosition,
    pub source: SourceContext,
    pub emitted_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(job: impl Into<String>, position: ResumePosition, source: SourceContext) -> Self {
        Self {
            job: job.into(),
            position,
            source,
            emitted_at: Utc::now(),
        }
    }

    /// Payload handed to the continuation invocation
    pub fn to_payload(&self) -> TriggerPayload {
        TriggerPayload {
            resume_index: Some(self.position.index),
            cursor: self.position.cursor.clone(),
            source_key: self.source.source_key.clone(),
            source_container: self.source.source_container.clone(),
        }
    }
}

/// Continuation invocation input
///
/// All keys are optional; absent keys mean "start fresh". The snake_case
/// aliases are the key names older deployments still send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerPayload {
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "start_index")]
    pub resume_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "next_page_uri")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "file_key")]
    pub source_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "bucket_name")]
    pub source_container: Option<String>,
}

impl TriggerPayload {
    /// Parse an invocation payload, also accepting an object-storage event
    /// notification (`Records[0].s3.bucket.name` / `Records[0].s3.object.key`)
    pub fn from_value(value: Value) -> IngestResult<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }

        let notification = value
            .get("Records")
            .and_then(|records| records.get(0))
            .and_then(|record| record.get("s3"))
            .map(|s3| {
                (
                    s3.pointer("/bucket/name").and_then(Value::as_str).map(str::to_string),
                    s3.pointer("/object/key").and_then(Value::as_str).map(str::to_string),
                )
            });

        let mut payload: TriggerPayload = serde_json::from_value(value)?;

        if let Some((bucket, key)) = notification {
            if payload.source_container.is_none() {
                payload.source_container = bucket;
            }
            if payload.source_key.is_none() {
                payload.source_key = key;
            }
        }

        Ok(payload)
    }

    pub fn from_json(raw: &str) -> IngestResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Self::from_value(serde_json::from_str(raw)?)
    }

    /// Payload carrying only the source context, used to start a new chain
    pub fn for_source(source: &SourceContext) -> Self {
        Self {
            source_key: source.source_key.clone(),
            source_container: source.source_container.clone(),
            ..Self::default()
        }
    }

    pub fn is_fresh_start(&self) -> bool {
        self.resume_index.is_none() && self.cursor.is_none()
    }

    pub fn resume_position(&self) -> ResumePosition {
        ResumePosition {
            cursor: self.cursor.clone(),
            index: self.resume_index.unwrap_or(0),
        }
    }

    pub fn source_context(&self) -> SourceContext {
        SourceContext {
            source_key: self.source_key.clone(),
            source_container: self.source_container.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_payload_is_fresh_start() {
        let payload = TriggerPayload::from_value(json!({})).unwrap();
        assert!(payload.is_fresh_start());
        assert_eq!(payload.resume_position(), ResumePosition::start());

        let null_payload = TriggerPayload::from_value(Value::Null).unwrap();
        assert!(null_payload.is_fresh_start());
    }

    #[test]
    fn test_camel_case_keys() {
        let payload = TriggerPayload::from_value(json!({
            "resumeIndex": 4200,
            "sourceKey": "calls.csv",
            "sourceContainer": "velocify-calls"
        }))
        .unwrap();

        assert_eq!(payload.resume_index, Some(4200));
        assert_eq!(payload.resume_position(), ResumePosition::at_index(4200));
        assert_eq!(payload.source_context(), SourceContext::new("velocify-calls", "calls.csv"));
        assert!(!payload.is_fresh_start());
    }

    #[test]
    fn test_legacy_aliases() {
        let payload = TriggerPayload::from_value(json!({
            "start_index": 12,
            "file_key": "calls.csv",
            "bucket_name": "velocify-calls"
        }))
        .unwrap();
        assert_eq!(payload.resume_index, Some(12));
        assert_eq!(payload.source_key.as_deref(), Some("calls.csv"));

        let paged = TriggerPayload::from_value(json!({"next_page_uri": "https://x/page2"})).unwrap();
        assert_eq!(paged.cursor.as_deref(), Some("https://x/page2"));
    }

    #[test]
    fn test_storage_event_notification() {
        let payload = TriggerPayload::from_value(json!({
            "Records": [{
                "s3": {
                    "bucket": {"name": "velocify-calls"},
                    "object": {"key": "CallHistory.csv"}
                }
            }]
        }))
        .unwrap();

        assert!(payload.is_fresh_start());
        assert_eq!(payload.source_container.as_deref(), Some("velocify-calls"));
        assert_eq!(payload.source_key.as_deref(), Some("CallHistory.csv"));
    }

    #[test]
    fn test_checkpoint_payload_serialization_omits_absent_keys() {
        let checkpoint = Checkpoint::new(
            "recording-download",
            ResumePosition::at_index(7),
            SourceContext::new("bucket", "file.csv"),
        );
        let value = serde_json::to_value(checkpoint.to_payload()).unwrap();
        assert_eq!(
            value,
            json!({"resumeIndex": 7, "sourceKey": "file.csv", "sourceContainer": "bucket"})
        );

        let paginated = Checkpoint::new("call-log", ResumePosition::at_cursor("p2", 1), SourceContext::default());
        let value = serde_json::to_value(paginated.to_payload()).unwrap();
        assert_eq!(value[payload_keys::RESUME_INDEX], 1);
        assert_eq!(value[payload_keys::CURSOR], "p2");
        assert!(value.get(payload_keys::SOURCE_KEY).is_none());
    }

    #[test]
    fn test_negative_index_is_rejected() {
        assert!(TriggerPayload::from_value(json!({"resumeIndex": -1})).is_err());
    }

    #[test]
    fn test_source_defaults_do_not_override_payload() {
        let source = SourceContext {
            source_key: Some("from-payload.csv".to_string()),
            source_container: None,
        }
        .with_defaults(Some("default-bucket"), Some("default.csv"));

        assert_eq!(source.source_key.as_deref(), Some("from-payload.csv"));
        assert_eq!(source.source_container.as_deref(), Some("default-bucket"));
        assert!(SourceContext::default().require_key().is_err());
    }
}
