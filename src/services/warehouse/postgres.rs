//! PostgreSQL-backed warehouse executor.
//!
//! Each submitted statement runs on its own spawned task; its status is tracked
//! by statement id until a poll observes a terminal status or the caller
//! discards it. Rows of finished statements are kept until fetched.

use super::{QueryRows, SqlStatement, SqlType, SqlValue, StatementStatus, WarehouseExecutor};
use crate::error::{IngestError, IngestResult};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use dashmap::DashMap;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StatementEntry {
    status: StatementStatus,
    rows: QueryRows,
}

#[derive(Debug, Clone)]
pub struct PgWarehouseExecutor {
    pool: PgPool,
    statements: Arc<DashMap<String, StatementEntry>>,
    results: Arc<DashMap<String, QueryRows>>,
}

impl PgWarehouseExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statements: Arc::new(DashMap::new()),
            results: Arc::new(DashMap::new()),
        }
    }

    /// Connect a pool lazily; the first statement opens the first connection
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> IngestResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_lazy(database_url)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Statements submitted and not yet observed terminal or discarded
    pub fn tracked_statements(&self) -> usize {
        self.statements.len()
    }
}

fn bind_params<'q>(statement: &'q SqlStatement) -> Query<'q, Postgres, PgArguments> {
    statement
        .params
        .iter()
        .fold(sqlx::query(&statement.sql), |query, value| match value {
            SqlValue::Null(SqlType::Text) => query.bind(None::<String>),
            SqlValue::Null(SqlType::Integer) => query.bind(None::<i64>),
            SqlValue::Null(SqlType::Float) => query.bind(None::<f64>),
            SqlValue::Null(SqlType::Bool) => query.bind(None::<bool>),
            SqlValue::Null(SqlType::Timestamp) => query.bind(None::<NaiveDateTime>),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Timestamp(v) => query.bind(*v),
        })
}

fn row_as_text(row: &PgRow) -> Vec<Option<String>> {
    (0..row.len())
        .map(|index| {
            row.try_get::<Option<String>, _>(index)
                .or_else(|_| row.try_get::<Option<i64>, _>(index).map(|v| v.map(|v| v.to_string())))
                .or_else(|_| row.try_get::<Option<i32>, _>(index).map(|v| v.map(|v| v.to_string())))
                .or_else(|_| row.try_get::<Option<f64>, _>(index).map(|v| v.map(|v| v.to_string())))
                .or_else(|_| row.try_get::<Option<bool>, _>(index).map(|v| v.map(|v| v.to_string())))
                .or_else(|_| row.try_get::<Option<NaiveDateTime>, _>(index).map(|v| v.map(|v| v.to_string())))
                .unwrap_or(None)
        })
        .collect()
}

#[async_trait]
impl WarehouseExecutor for PgWarehouseExecutor {
    async fn submit(&self, statement: &SqlStatement) -> IngestResult<String> {
        let statement_id = Uuid::new_v4().to_string();
        self.statements.insert(
            statement_id.clone(),
            StatementEntry {
                status: StatementStatus::Submitted,
                rows: Vec::new(),
            },
        );

        let pool = self.pool.clone();
        let statements = Arc::clone(&self.statements);
        let statement = statement.clone();
        let id = statement_id.clone();

        tokio::spawn(async move {
            if let Some(mut entry) = statements.get_mut(&id) {
                entry.status = StatementStatus::Started;
            }

            let outcome = bind_params(&statement).fetch_all(&pool).await;
            let entry = match outcome {
                Ok(rows) => {
                    debug!(statement_id = %id, rows = rows.len(), "Statement finished");
                    StatementEntry {
                        status: StatementStatus::Finished,
                        rows: rows.iter().map(row_as_text).collect(),
                    }
                }
                Err(e) => {
                    error!(statement_id = %id, error = %e, "Statement failed");
                    StatementEntry {
                        status: StatementStatus::Failed(e.to_string()),
                        rows: Vec::new(),
                    }
                }
            };
            // a discarded statement stays discarded
            if let Some(mut tracked) = statements.get_mut(&id) {
                *tracked = entry;
            }
        });

        Ok(statement_id)
    }

    async fn poll(&self, statement_id: &str) -> IngestResult<StatementStatus> {
        let status = self
            .statements
            .get(statement_id)
            .map(|entry| entry.status.clone())
            .ok_or_else(|| IngestError::warehouse_statement(statement_id, "unknown statement"))?;

        if status.is_terminal() {
            if let Some((id, entry)) = self.statements.remove(statement_id) {
                if !entry.rows.is_empty() {
                    self.results.insert(id, entry.rows);
                }
            }
        }
        Ok(status)
    }

    async fn fetch_rows(&self, statement_id: &str) -> IngestResult<QueryRows> {
        Ok(self
            .results
            .remove(statement_id)
            .map(|(_, rows)| rows)
            .unwrap_or_default())
    }

    async fn discard(&self, statement_id: &str) {
        if self.statements.remove(statement_id).is_some() {
            debug!(statement_id = %statement_id, "Discarded statement");
        }
        self.results.remove(statement_id);
    }
}
