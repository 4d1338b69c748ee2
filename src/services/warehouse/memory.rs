//! Warehouse executor that records statements instead of running them.
//!
//! Used for dry runs when no database is configured, and by tests to assert
//! on the exact statements a job issues.

use super::{QueryRows, SqlStatement, StatementStatus, WarehouseExecutor};
use crate::error::{IngestError, IngestResult};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

#[derive(Debug)]
struct PendingStatement {
    remaining_polls: u32,
    outcome: StatementStatus,
    rows: QueryRows,
}

#[derive(Debug, Default)]
pub struct RecordingWarehouse {
    executed: Mutex<Vec<SqlStatement>>,
    statements: DashMap<String, PendingStatement>,
    pending_polls: u32,
    failing: Vec<String>,
    responses: Vec<(String, QueryRows)>,
}

impl RecordingWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `Started` this many times before the terminal status
    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    /// Statements whose SQL contains `fragment` end in `FAILED`
    pub fn fail_matching(mut self, fragment: impl Into<String>) -> Self {
        self.failing.push(fragment.into());
        self
    }

    /// Statements whose SQL contains `fragment` return `rows`
    pub fn respond_to(mut self, fragment: impl Into<String>, rows: QueryRows) -> Self {
        self.responses.push((fragment.into(), rows));
        self
    }

    /// Every statement submitted so far, in order
    pub fn executed(&self) -> Vec<SqlStatement> {
        self.executed.lock().clone()
    }

    /// Statements still awaiting a poll or fetch
    pub fn tracked_statements(&self) -> usize {
        self.statements.len()
    }

    pub fn executed_matching(&self, fragment: &str) -> Vec<SqlStatement> {
        self.executed
            .lock()
            .iter()
            .filter(|statement| statement.sql.contains(fragment))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl WarehouseExecutor for RecordingWarehouse {
    async fn submit(&self, statement: &SqlStatement) -> IngestResult<String> {
        let statement_id = Uuid::new_v4().to_string();
        info!(statement_id = %statement_id, statement = %statement, "Recorded warehouse statement");

        let outcome = match self.failing.iter().find(|f| statement.sql.contains(f.as_str())) {
            Some(fragment) => StatementStatus::Failed(format!("statement matched failing fragment '{fragment}'")),
            None => StatementStatus::Finished,
        };
        let rows = self
            .responses
            .iter()
            .find(|(fragment, _)| statement.sql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();

        self.executed.lock().push(statement.clone());
        self.statements.insert(
            statement_id.clone(),
            PendingStatement {
                remaining_polls: self.pending_polls,
                outcome,
                rows,
            },
        );
        Ok(statement_id)
    }

    async fn poll(&self, statement_id: &str) -> IngestResult<StatementStatus> {
        let mut entry = self
            .statements
            .get_mut(statement_id)
            .ok_or_else(|| IngestError::warehouse_statement(statement_id, "unknown statement"))?;

        if entry.remaining_polls > 0 {
            entry.remaining_polls -= 1;
            return Ok(StatementStatus::Started);
        }
        Ok(entry.outcome.clone())
    }

    async fn fetch_rows(&self, statement_id: &str) -> IngestResult<QueryRows> {
        self.statements
            .get(statement_id)
            .map(|entry| entry.rows.clone())
            .ok_or_else(|| IngestError::warehouse_statement(statement_id, "unknown statement"))
    }

    async fn discard(&self, statement_id: &str) {
        self.statements.remove(statement_id);
    }
}
