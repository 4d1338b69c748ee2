//! # Local Chain Driver
//!
//! Runs a whole chain in one process: every continuation the trigger channel
//! receives is fed back into the handler, in dispatch order, until no work is
//! queued. Downstream jobs started by a chain are driven the same way.

use super::InvocationHandler;
use crate::constants::status_codes;
use crate::job::{Continuation, InvocationResponse, TriggerPayload};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

/// One invocation of a locally driven chain
#[derive(Debug, Clone, Serialize)]
pub struct ChainStep {
    pub job: String,
    pub payload: TriggerPayload,
    pub response: InvocationResponse,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChainReport {
    pub steps: Vec<ChainStep>,
    /// Continuations left unrun when the invocation limit was hit
    pub pending: usize,
}

impl ChainReport {
    pub fn invocations(&self) -> usize {
        self.steps.len()
    }

    pub fn last_response(&self) -> Option<&InvocationResponse> {
        self.steps.last().map(|step| &step.response)
    }

    /// Every chain reached a terminal status and none failed
    pub fn is_complete(&self) -> bool {
        self.pending == 0 && self.steps.iter().all(|step| step.response.status_code != status_codes::FAILED)
    }
}

pub struct LocalChainDriver {
    handler: InvocationHandler,
    receiver: UnboundedReceiver<Continuation>,
    max_invocations: usize,
}

impl LocalChainDriver {
    /// `receiver` must be the other end of the `ChannelTrigger` the handler's jobs dispatch to
    pub fn new(handler: InvocationHandler, receiver: UnboundedReceiver<Continuation>, max_invocations: usize) -> Self {
        Self {
            handler,
            receiver,
            max_invocations,
        }
    }

    pub async fn run(&mut self, job: &str, payload: TriggerPayload) -> ChainReport {
        let mut queue = VecDeque::from([Continuation {
            job: job.to_string(),
            payload,
        }]);
        let mut report = ChainReport::default();

        while let Some(next) = queue.pop_front() {
            if report.steps.len() >= self.max_invocations {
                queue.push_front(next);
                warn!(
                    max_invocations = self.max_invocations,
                    pending = queue.len(),
                    "Invocation limit reached, stopping chain"
                );
                break;
            }

            let response = self.handler.handle_payload(&next.job, next.payload.clone()).await;
            info!(
                job = %next.job,
                invocation = report.steps.len() + 1,
                status = response.status_code,
                "Chain invocation finished"
            );
            report.steps.push(ChainStep {
                job: next.job,
                payload: next.payload,
                response,
            });

            while let Ok(continuation) = self.receiver.try_recv() {
                queue.push_back(continuation);
            }
        }

        report.pending = queue.len();
        report
    }
}
