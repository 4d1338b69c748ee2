//! # Warehouse Access
//!
//! Statements are submitted asynchronously and then polled until they reach a
//! terminal status, the way managed warehouse data APIs behave. The
//! [`WarehouseClient`] owns the poll loop; [`WarehouseExecutor`] realizations
//! only submit, report status, and hand back result rows.

pub mod memory;
pub mod postgres;
pub mod statement;

pub use memory::RecordingWarehouse;
pub use postgres::PgWarehouseExecutor;
pub use statement::{validate_identifier, SqlStatement, SqlType, SqlValue};

use crate::constants::timing::{WAREHOUSE_MAX_POLL_ATTEMPTS, WAREHOUSE_POLL_INTERVAL_MS};
use crate::error::{IngestError, IngestResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Result rows, every column rendered as text
pub type QueryRows = Vec<Vec<Option<String>>>;

/// Lifecycle of a submitted statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementStatus {
    Submitted,
    Started,
    Finished,
    Failed(String),
    Aborted,
}

impl StatementStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed(_) | Self::Aborted)
    }
}

impl fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted => f.write_str("SUBMITTED"),
            Self::Started => f.write_str("STARTED"),
            Self::Finished => f.write_str("FINISHED"),
            Self::Failed(_) => f.write_str("FAILED"),
            Self::Aborted => f.write_str("ABORTED"),
        }
    }
}

#[async_trait]
pub trait WarehouseExecutor: Send + Sync {
    /// Submit a statement and return its id without waiting for it
    async fn submit(&self, statement: &SqlStatement) -> IngestResult<String>;

    async fn poll(&self, statement_id: &str) -> IngestResult<StatementStatus>;

    /// Rows of a finished statement
    async fn fetch_rows(&self, statement_id: &str) -> IngestResult<QueryRows>;

    /// Forget a statement the caller stopped waiting for
    async fn discard(&self, _statement_id: &str) {}
}

/// Submits statements and waits for them to finish
#[derive(Clone)]
pub struct WarehouseClient {
    executor: Arc<dyn WarehouseExecutor>,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl fmt::Debug for WarehouseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseClient")
            .field("poll_interval", &self.poll_interval)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .finish_non_exhaustive()
    }
}

impl WarehouseClient {
    pub fn new(executor: Arc<dyn WarehouseExecutor>) -> Self {
        Self {
            executor,
            poll_interval: Duration::from_millis(WAREHOUSE_POLL_INTERVAL_MS),
            max_poll_attempts: WAREHOUSE_MAX_POLL_ATTEMPTS,
        }
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_poll_attempts: u32) -> Self {
        self.poll_interval = poll_interval;
        self.max_poll_attempts = max_poll_attempts.max(1);
        self
    }

    /// Run a statement to completion and return its id
    #[instrument(skip_all, fields(sql = %statement.sql))]
    pub async fn execute(&self, statement: &SqlStatement) -> IngestResult<String> {
        let statement_id = self.executor.submit(statement).await?;
        self.wait_for(&statement_id).await?;
        Ok(statement_id)
    }

    /// Run a statement to completion and return its rows
    pub async fn query(&self, statement: &SqlStatement) -> IngestResult<QueryRows> {
        let statement_id = self.execute(statement).await?;
        self.executor.fetch_rows(&statement_id).await
    }

    /// Run statements in order, stopping at the first failure
    pub async fn execute_all(&self, statements: &[SqlStatement]) -> IngestResult<Vec<String>> {
        let mut ids = Vec::with_capacity(statements.len());
        for statement in statements {
            ids.push(self.execute(statement).await?);
        }
        Ok(ids)
    }

    async fn wait_for(&self, statement_id: &str) -> IngestResult<()> {
        for attempt in 0..self.max_poll_attempts {
            let status = self.executor.poll(statement_id).await?;
            debug!(statement_id = %statement_id, status = %status, attempt, "Polled statement");

            match status {
                StatementStatus::Finished => return Ok(()),
                StatementStatus::Failed(message) => {
                    self.executor.discard(statement_id).await;
                    return Err(IngestError::statement_failed(statement_id, "FAILED", message));
                }
                StatementStatus::Aborted => {
                    self.executor.discard(statement_id).await;
                    return Err(IngestError::statement_failed(
                        statement_id,
                        "ABORTED",
                        "statement was aborted",
                    ));
                }
                StatementStatus::Submitted | StatementStatus::Started => {
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        self.executor.discard(statement_id).await;
        Err(IngestError::warehouse_statement(
            statement_id,
            format!("no terminal status after {} polls", self.max_poll_attempts),
        ))
    }
}
