//! # Resumable Bounded-Time Jobs
//!
//! The core abstraction of the crate: a job iterates an ordered work sequence,
//! samples a monotonic clock before every item, and when the elapsed time
//! reaches its budget it stops, emits a [`Checkpoint`], and triggers a fresh
//! invocation of itself carrying that checkpoint.
//!
//! ## Module Organization
//!
//! - [`checkpoint`] - Resume positions, source context, trigger payloads
//! - [`clock`] - Invocation clock
//! - [`state`] - Per-invocation state machine
//! - [`result`] - Invocation outcome and platform response
//! - [`sequence`] - The `ResumableJob` trait and work batches
//! - [`trigger`] - Continuation dispatch
//! - [`runner`] - The bounded-time loop

pub mod checkpoint;
pub mod clock;
pub mod result;
pub mod runner;
pub mod sequence;
pub mod state;
pub mod trigger;

pub use checkpoint::{Checkpoint, ResumePosition, SourceContext, TriggerPayload};
pub use clock::JobClock;
pub use result::{InvocationResponse, JobResult, JobSummary};
pub use runner::{BoundJob, InvocableJob, ResumableJobRunner};
pub use sequence::{ItemOutcome, ResumableJob, WorkBatch};
pub use state::{JobState, JobStateMachine};
pub use trigger::{ChannelTrigger, Continuation, ContinuationTrigger, HttpInvokeTrigger, RecordingTrigger};
