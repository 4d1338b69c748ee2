//! # Job Results
//!
//! `JobResult` is created once per invocation and returned to the invoking
//! platform as an `InvocationResponse`; nothing here is persisted.

use super::checkpoint::{Checkpoint, TriggerPayload};
use super::state::JobState;
use crate::constants::status_codes;
use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counters for one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Items whose side effect was performed
    pub processed: usize,
    /// Items with nothing to do (no recording, filtered out)
    pub skipped: usize,
    /// Items whose processing failed and were logged and skipped
    pub failed: usize,
    /// Batches fetched from the work sequence
    pub batches: usize,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl JobSummary {
    /// Items the loop moved past, whatever their outcome
    pub fn visited(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Tagged outcome of one invocation
#[derive(Debug)]
pub enum JobResult {
    Completed {
        summary: JobSummary,
    },
    Continued {
        checkpoint: Checkpoint,
        summary: JobSummary,
    },
    Failed {
        error: IngestError,
        summary: JobSummary,
    },
}

impl JobResult {
    pub fn state(&self) -> JobState {
        match self {
            Self::Completed { .. } => JobState::Completed,
            Self::Continued { .. } => JobState::Continuing,
            Self::Failed { .. } => JobState::Failed,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Completed { .. } => status_codes::COMPLETED,
            Self::Continued { .. } => status_codes::CONTINUED,
            Self::Failed { .. } => status_codes::FAILED,
        }
    }

    pub fn summary(&self) -> &JobSummary {
        match self {
            Self::Completed { summary }
            | Self::Continued { summary, .. }
            | Self::Failed { summary, .. } => summary,
        }
    }

    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        match self {
            Self::Continued { checkpoint, .. } => Some(checkpoint),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_continued(&self) -> bool {
        matches!(self, Self::Continued { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl From<IngestError> for JobResult {
    fn from(error: IngestError) -> Self {
        JobResult::Failed {
            error,
            summary: JobSummary::default(),
        }
    }
}

/// Response returned to the hosting platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub status_code: u16,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<TriggerPayload>,
}

impl InvocationResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status_code: status_codes::FAILED,
            body: message.into(),
            checkpoint: None,
        }
    }
}

impl From<&JobResult> for InvocationResponse {
    fn from(result: &JobResult) -> Self {
        let body = match result {
            JobResult::Completed { summary } => format!(
                "Completed: {} processed, {} skipped, {} failed",
                summary.processed, summary.skipped, summary.failed
            ),
            JobResult::Continued { checkpoint, .. } => {
                format!("Reinvoked {} at {}", checkpoint.job, checkpoint.position)
            }
            JobResult::Failed { error, .. } => format!("Error: {error}"),
        };

        Self {
            status_code: result.status_code(),
            body,
            checkpoint: result.checkpoint().map(Checkpoint::to_payload),
        }
    }
}
