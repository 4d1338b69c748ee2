#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, RingCentral in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Call Ingest
//!
//! Resumable, bounded-time ingestion jobs for call-center data.
//!
//! ## Overview
//!
//! Each job runs inside a serverless function with a hard execution ceiling.
//! A job walks an ordered work sequence (rows of a CSV object, objects in a
//! container, or pages of a telephony API), performs one durable write per
//! item, and samples a monotonic clock before every item. When the clock
//! reaches the job's budget the job stops, emits a checkpoint, and triggers a
//! fresh invocation of itself that resumes from that checkpoint. The chain
//! ends when the sequence is exhausted.
//!
//! ## Module Organization
//!
//! - [`job`] - The bounded-time runner, checkpoints and continuation triggers
//! - [`jobs`] - Concrete jobs: call-log fetch, recording download, row load, storage sweep
//! - [`services`] - Object storage, secrets, HTTP and warehouse collaborators
//! - [`telephony`] - RingCentral and CallRail clients
//! - [`transform`] - One-shot CSV and JSON utilities
//! - [`config`] - Layered YAML configuration
//! - [`registry`] - Job registry and factory
//! - [`handler`] - Invocation entry point and local chain driver
//! - [`resilience`] - Retry policy for rate-limited upstreams
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use call_ingest::config::ConfigManager;
//! use call_ingest::handler::{InvocationHandler, ServiceHandles};
//! use call_ingest::job::RecordingTrigger;
//! use call_ingest::registry::JobFactory;
//! use call_ingest::services::EnvSecretStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let services = ServiceHandles::from_config(
//!     manager.config(),
//!     Arc::new(EnvSecretStore::new()),
//!     Arc::new(RecordingTrigger::new()),
//! )
//! .await?;
//! let registry = JobFactory::new(manager.config(), &services).build_registry().await?;
//!
//! let handler = InvocationHandler::new(Arc::new(registry));
//! let response = handler.handle("delete-old-velocify-recordings", "{}").await;
//! println!("{}", response.body);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod handler;
pub mod job;
pub mod jobs;
pub mod logging;
pub mod registry;
pub mod resilience;
pub mod services;
pub mod telephony;
pub mod transform;

pub use config::{ConfigManager, ConfigurationError, IngestConfig};
pub use error::{IngestError, IngestResult};
pub use handler::{InvocationHandler, LocalChainDriver, ServiceHandles};
pub use job::{Checkpoint, InvocationResponse, JobResult, ResumableJob, ResumableJobRunner, TriggerPayload};
pub use registry::{JobFactory, JobRegistry};
