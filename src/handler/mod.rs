//! # Invocation Handler
//!
//! The function entry point: resolve the job by name, parse the trigger
//! payload, run one bounded-time invocation and map the outcome to the
//! platform response. Nothing is retained between calls.
//!
//! ## Module Organization
//!
//! - [`services`] - Collaborator handles built from configuration
//! - [`chain`] - In-process chain driver for local runs

pub mod chain;
pub mod services;

pub use chain::{ChainReport, ChainStep, LocalChainDriver};
pub use services::ServiceHandles;

use crate::error::IngestError;
use crate::job::{InvocationResponse, JobResult, TriggerPayload};
use crate::logging::log_error;
use crate::registry::JobRegistry;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct InvocationHandler {
    registry: Arc<JobRegistry>,
}

impl InvocationHandler {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Handle a raw JSON payload; an empty body starts fresh
    pub async fn handle(&self, job: &str, payload: &str) -> InvocationResponse {
        match TriggerPayload::from_json(payload) {
            Ok(payload) => self.handle_payload(job, payload).await,
            Err(error) => Self::rejected(job, "parse_payload", error),
        }
    }

    pub async fn handle_value(&self, job: &str, payload: Value) -> InvocationResponse {
        match TriggerPayload::from_value(payload) {
            Ok(payload) => self.handle_payload(job, payload).await,
            Err(error) => Self::rejected(job, "parse_payload", error),
        }
    }

    pub async fn handle_payload(&self, job: &str, payload: TriggerPayload) -> InvocationResponse {
        match self.run(job, payload).await {
            Ok(result) => InvocationResponse::from(&result),
            Err(error) => Self::rejected(job, "resolve_job", error),
        }
    }

    /// Run one invocation and return the full result
    #[instrument(skip(self, payload))]
    pub async fn run(&self, job: &str, payload: TriggerPayload) -> Result<JobResult, IngestError> {
        let bound = self.registry.get(job)?;
        let result = bound.invoke(payload).await;
        info!(status = result.status_code(), state = %result.state(), "Invocation finished");
        Ok(result)
    }

    fn rejected(job: &str, operation: &str, error: IngestError) -> InvocationResponse {
        log_error("invocation_handler", operation, &error.to_string(), Some(job));
        InvocationResponse::failed(format!("Error: {error}"))
    }
}
