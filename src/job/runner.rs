//! # Resumable Job Runner
//!
//! Drives a [`ResumableJob`] through one bounded-time invocation.
//!
//! ## Invocation flow
//!
//! ```text
//! payload ──▶ fetch batch ──▶ for each item ──▶ elapsed ≥ budget? ──yes──▶ checkpoint + trigger ──▶ Continued
//!                 ▲                │ no
//!                 │                ▼
//!                 │          process item (errors logged, loop continues)
//!                 │
//!            next cursor? ◀── batch exhausted ──none──▶ Completed
//! ```
//!
//! The elapsed check runs before every item, so the worst-case overrun past the
//! budget is one item's processing time. A failing batch fetch ends the
//! invocation with `Failed` and emits no checkpoint. A fresh start hands the
//! source to the job's downstream chain once the first batch has been fetched,
//! so an unreadable source never starts it.

use super::checkpoint::{Checkpoint, ResumePosition, SourceContext, TriggerPayload};
use super::clock::JobClock;
use super::result::{JobResult, JobSummary};
use super::sequence::{ItemOutcome, ResumableJob};
use super::state::{JobState, JobStateMachine};
use super::trigger::ContinuationTrigger;
use crate::logging::{log_error, log_item_operation, log_job_operation};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

/// Runs jobs against a time budget and hands off continuations
#[derive(Clone)]
pub struct ResumableJobRunner {
    trigger: Arc<dyn ContinuationTrigger>,
    time_budget: Duration,
}

impl ResumableJobRunner {
    pub fn new(trigger: Arc<dyn ContinuationTrigger>, time_budget: Duration) -> Self {
        Self { trigger, time_budget }
    }

    pub fn time_budget(&self) -> Duration {
        self.time_budget
    }

    /// Run one invocation of `job` starting from `payload`
    #[instrument(skip_all, fields(job = %job.name()))]
    pub async fn run<J>(&self, job: &J, payload: &TriggerPayload) -> JobResult
    where
        J: ResumableJob + ?Sized,
    {
        let clock = JobClock::start(self.time_budget);
        let mut machine = JobStateMachine::new(job.name());
        machine.transition_to(JobState::Running);

        let source = payload.source_context();
        let mut position = payload.resume_position();
        let mut summary = JobSummary::default();

        log_job_operation(
            "start",
            job.name(),
            "running",
            Some(position.index),
            position.cursor.as_deref(),
            None,
        );

        let mut downstream_pending = payload.is_fresh_start();

        loop {
            let batch = match job.fetch_batch(&source, position.cursor.as_deref()).await {
                Ok(batch) => batch,
                Err(error) => {
                    summary.elapsed = clock.elapsed();
                    machine.transition_to(JobState::Failed);
                    log_error("job_runner", "fetch_batch", &error.to_string(), Some(job.name()));
                    return JobResult::Failed { error, summary };
                }
            };
            summary.batches += 1;

            if std::mem::take(&mut downstream_pending) {
                self.start_downstream(job, &source).await;
            }

            info!(
                batch_size = batch.len(),
                start_offset = position.index,
                has_next = batch.next_cursor.is_some(),
                "Fetched work batch"
            );

            for (offset, item) in batch.items.iter().enumerate().skip(position.index) {
                if clock.is_exhausted() {
                    let resume_at = match job.resume_cursor(item) {
                        Some(cursor) => ResumePosition::at_cursor(cursor, 0),
                        None => ResumePosition {
                            cursor: position.cursor.clone(),
                            index: offset,
                        },
                    };
                    return self
                        .continue_chain(job, &mut machine, resume_at, source, summary, &clock)
                        .await;
                }

                let label = job.describe_item(item);
                let started = Instant::now();
                let outcome = job.process_item(&source, item).await;
                let duration_ms = started.elapsed().as_millis() as u64;

                match outcome {
                    Ok(ItemOutcome::Processed) => {
                        summary.processed += 1;
                        log_item_operation(job.name(), offset, &label, "processed", Some(duration_ms));
                    }
                    Ok(ItemOutcome::Skipped(reason)) => {
                        summary.skipped += 1;
                        log_item_operation(job.name(), offset, &label, &reason, Some(duration_ms));
                    }
                    Err(error) => {
                        summary.failed += 1;
                        warn!(
                            position = offset,
                            item = %label,
                            error = %error,
                            "Work item failed, continuing with next item"
                        );
                    }
                }
            }

            match batch.next_cursor {
                Some(next_cursor) => {
                    let next = ResumePosition::at_cursor(next_cursor, 0);
                    if clock.is_exhausted() {
                        return self
                            .continue_chain(job, &mut machine, next, source, summary, &clock)
                            .await;
                    }
                    position = next;
                }
                None => {
                    summary.elapsed = clock.elapsed();
                    machine.transition_to(JobState::Completed);
                    log_job_operation(
                        "complete",
                        job.name(),
                        "completed",
                        None,
                        None,
                        Some(&format!(
                            "processed={} skipped={} failed={}",
                            summary.processed, summary.skipped, summary.failed
                        )),
                    );
                    return JobResult::Completed { summary };
                }
            }
        }
    }

    /// Emit the checkpoint, trigger the successor, and stop
    async fn continue_chain<J>(
        &self,
        job: &J,
        machine: &mut JobStateMachine,
        position: ResumePosition,
        source: SourceContext,
        mut summary: JobSummary,
        clock: &JobClock,
    ) -> JobResult
    where
        J: ResumableJob + ?Sized,
    {
        summary.elapsed = clock.elapsed();
        machine.transition_to(JobState::Continuing);

        let checkpoint = Checkpoint::new(job.name(), position, source);
        log_job_operation(
            "continue",
            job.name(),
            "continuing",
            Some(checkpoint.position.index),
            checkpoint.position.cursor.as_deref(),
            Some(&format!("elapsed_ms={}", summary.elapsed.as_millis())),
        );

        // The chain is not enforced: a lost dispatch stalls it until an
        // operator restarts from the checkpoint in the response.
        if let Err(error) = self.trigger.invoke_async(job.name(), &checkpoint.to_payload()).await {
            log_error(
                "job_runner",
                "invoke_continuation",
                &error.to_string(),
                Some(&format!("{} at {}", checkpoint.job, checkpoint.position)),
            );
        }

        JobResult::Continued { checkpoint, summary }
    }

    async fn start_downstream<J>(&self, job: &J, source: &SourceContext)
    where
        J: ResumableJob + ?Sized,
    {
        let Some(downstream) = job.downstream_job() else {
            return;
        };

        info!(downstream = %downstream, "Starting downstream chain");
        if let Err(error) = self
            .trigger
            .invoke_async(downstream, &TriggerPayload::for_source(source))
            .await
        {
            log_error("job_runner", "start_downstream", &error.to_string(), Some(downstream));
        }
    }
}

/// Type-erased job invocation, as held by the registry
#[async_trait]
pub trait InvocableJob: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, payload: TriggerPayload) -> JobResult;
}

/// A job paired with the runner that executes it
pub struct BoundJob<J> {
    job: J,
    runner: ResumableJobRunner,
    source_defaults: SourceContext,
}

impl<J: ResumableJob> BoundJob<J> {
    pub fn new(job: J, runner: ResumableJobRunner) -> Self {
        Self {
            job,
            runner,
            source_defaults: SourceContext::default(),
        }
    }

    /// Source used for payloads that name none
    pub fn with_source_defaults(mut self, container: Option<String>, key: Option<String>) -> Self {
        self.source_defaults = SourceContext {
            source_key: key,
            source_container: container,
        };
        self
    }

    pub fn job(&self) -> &J {
        &self.job
    }

    pub fn runner(&self) -> &ResumableJobRunner {
        &self.runner
    }
}

#[async_trait]
impl<J> InvocableJob for BoundJob<J>
where
    J: ResumableJob + 'static,
{
    fn name(&self) -> &str {
        self.job.name()
    }

    async fn invoke(&self, mut payload: TriggerPayload) -> JobResult {
        if payload.source_container.is_none() {
            payload.source_container = self.source_defaults.source_container.clone();
        }
        if payload.source_key.is_none() {
            payload.source_key = self.source_defaults.source_key.clone();
        }
        self.runner.run(&self.job, &payload).await
    }
}

impl std::fmt::Debug for ResumableJobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumableJobRunner")
            .field("time_budget", &self.time_budget)
            .finish()
    }
}
