//! # Row Load
//!
//! Loads the rows of a CSV export into a warehouse table. Each row is an
//! upsert: delete any existing row with the same key, insert the referenced
//! lead if it is not known yet, then insert the mapped values. The lead goes
//! first because the row references it. Rerunning a row therefore never
//! duplicates it.

use super::csv_source::{load_rows, CsvRow};
use crate::error::{IngestError, IngestResult};
use crate::job::{ItemOutcome, ResumableJob, SourceContext, WorkBatch};
use crate::services::{SqlStatement, SqlType, SqlValue, WarehouseClient};
use crate::transform::duration_to_seconds;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// How a source field becomes a bound value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    #[default]
    Text,
    Integer,
    /// `h:m:s` converted to whole seconds
    DurationSeconds,
    /// Date and time without zone, see [`parse_timestamp`]
    Timestamp,
    /// The mapping's `value`, ignoring the row
    Constant,
}

impl ColumnKind {
    pub fn sql_type(self) -> SqlType {
        match self {
            Self::Text | Self::Constant => SqlType::Text,
            Self::Integer | Self::DurationSeconds => SqlType::Integer,
            Self::Timestamp => SqlType::Timestamp,
        }
    }
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
];

/// Parse the date-time layouts found in call exports
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// CSV header; unused for constants
    #[serde(default)]
    pub source: Option<String>,
    pub target: String,
    #[serde(default)]
    pub kind: ColumnKind,
    #[serde(default)]
    pub value: Option<String>,
}

impl ColumnMapping {
    pub fn text(source: &str, target: &str) -> Self {
        Self::of_kind(source, target, ColumnKind::Text)
    }

    pub fn of_kind(source: &str, target: &str, kind: ColumnKind) -> Self {
        Self {
            source: Some(source.to_string()),
            target: target.to_string(),
            kind,
            value: None,
        }
    }

    pub fn constant(target: &str, value: &str) -> Self {
        Self {
            source: None,
            target: target.to_string(),
            kind: ColumnKind::Constant,
            value: Some(value.to_string()),
        }
    }

    /// Bound value for `row`; missing or unparseable fields become a `Null`
    /// of the column's type
    pub fn extract(&self, row: &CsvRow) -> SqlValue {
        if self.kind == ColumnKind::Constant {
            return SqlValue::text_or_null(self.value.as_deref());
        }

        let raw = self.source.as_deref().and_then(|source| row.get(source));
        let value = match self.kind {
            ColumnKind::Text | ColumnKind::Constant => return SqlValue::text_or_null(raw),
            ColumnKind::Integer => raw.and_then(|v| v.parse::<i64>().ok()).map(SqlValue::Integer),
            ColumnKind::DurationSeconds => raw.and_then(duration_to_seconds).map(SqlValue::Integer),
            ColumnKind::Timestamp => raw.and_then(parse_timestamp).map(SqlValue::Timestamp),
        };
        value.unwrap_or(SqlValue::Null(self.kind.sql_type()))
    }
}

fn default_broker_table() -> String {
    "public.broker".to_string()
}

fn default_id_column() -> String {
    "broker_id".to_string()
}

fn default_name_column() -> String {
    "broker_name".to_string()
}

/// Resolve an agent name (`Last, First`) to a broker id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerLookup {
    pub source: String,
    pub target: String,
    #[serde(default = "default_broker_table")]
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_name_column")]
    pub name_column: String,
    /// Type of the id column in the target table
    #[serde(default)]
    pub id_type: SqlType,
}

impl BrokerLookup {
    /// Lookup statement for a raw agent name
    pub fn statement(&self, raw_name: &str) -> IngestResult<SqlStatement> {
        let name = reorder_broker_name(raw_name);
        SqlStatement::lookup_ilike(&self.table, &self.id_column, &self.name_column, &name)
    }

    fn bind_id(&self, id: Option<String>) -> SqlValue {
        match (self.id_type, id) {
            (SqlType::Integer, Some(id)) => id
                .parse::<i64>()
                .map_or(SqlValue::Null(SqlType::Integer), SqlValue::Integer),
            (SqlType::Text, Some(id)) => SqlValue::Text(id),
            (sql_type, _) => SqlValue::Null(sql_type),
        }
    }
}

/// Insert the row's lead unless it already exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadUpsert {
    pub table: String,
    pub key_column: String,
    /// Columns of the lead row; must include `key_column`
    pub columns: Vec<ColumnMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    pub table: String,
    /// Target column identifying a row for the delete-then-insert
    pub key_column: String,
    pub columns: Vec<ColumnMapping>,
    #[serde(default)]
    pub broker_lookup: Option<BrokerLookup>,
    #[serde(default)]
    pub lead_upsert: Option<LeadUpsert>,
}

impl TableMapping {
    pub fn validate(&self) -> IngestResult<()> {
        if self.columns.is_empty() {
            return Err(IngestError::configuration(&self.table, "table mapping has no columns"));
        }
        if !self.columns.iter().any(|column| column.target == self.key_column) {
            return Err(IngestError::configuration(
                &self.table,
                format!("key column {} is not mapped", self.key_column),
            ));
        }
        if let Some(lead) = &self.lead_upsert {
            if !lead.columns.iter().any(|column| column.target == lead.key_column) {
                return Err(IngestError::configuration(
                    &lead.table,
                    format!("lead key column {} is not mapped", lead.key_column),
                ));
            }
        }
        Ok(())
    }
}

/// `"Doe, Jane"` becomes `"Jane Doe"`; anything else is returned trimmed
pub fn reorder_broker_name(name: &str) -> String {
    match name.split_once(',') {
        Some((last, first)) if !first.trim().is_empty() => format!("{} {}", first.trim(), last.trim()),
        _ => name.trim().to_string(),
    }
}

pub struct RowLoadJob {
    name: String,
    store: Arc<dyn crate::services::ObjectStore>,
    warehouse: Arc<WarehouseClient>,
    mapping: TableMapping,
}

impl RowLoadJob {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn crate::services::ObjectStore>,
        warehouse: Arc<WarehouseClient>,
        mapping: TableMapping,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            warehouse,
            mapping,
        }
    }

    async fn lookup_broker(&self, lookup: &BrokerLookup, row: &CsvRow) -> IngestResult<SqlValue> {
        let Some(raw_name) = row.get(&lookup.source).filter(|name| !name.trim().is_empty()) else {
            return Ok(SqlValue::Null(lookup.id_type));
        };

        let rows = self.warehouse.query(&lookup.statement(raw_name)?).await?;
        let id = rows.into_iter().next().and_then(|row| row.into_iter().next()).flatten();
        if id.is_none() {
            debug!(broker = %raw_name, "No broker matched");
        }
        Ok(lookup.bind_id(id))
    }

    fn row_statements(&self, row: &CsvRow, broker_id: Option<SqlValue>) -> IngestResult<Vec<SqlStatement>> {
        let mut values: Vec<(String, SqlValue)> = self
            .mapping
            .columns
            .iter()
            .map(|column| (column.target.clone(), column.extract(row)))
            .collect();
        if let (Some(lookup), Some(broker_id)) = (&self.mapping.broker_lookup, broker_id) {
            values.push((lookup.target.clone(), broker_id));
        }

        let key = values
            .iter()
            .find(|(column, _)| *column == self.mapping.key_column)
            .map(|(_, value)| value.clone())
            .filter(|value| !value.is_null())
            .ok_or_else(|| IngestError::item_processing("row", format!("missing {}", self.mapping.key_column)))?;

        let mut statements = vec![SqlStatement::delete_where(&self.mapping.table, &self.mapping.key_column, key)?];

        if let Some(lead) = &self.mapping.lead_upsert {
            let lead_values: Vec<(String, SqlValue)> = lead
                .columns
                .iter()
                .map(|column| (column.target.clone(), column.extract(row)))
                .collect();
            let has_key = lead_values
                .iter()
                .any(|(column, value)| *column == lead.key_column && !value.is_null());

            if has_key {
                statements.push(SqlStatement::insert_if_absent(&lead.table, &lead.key_column, &lead_values)?);
            } else {
                warn!(table = %lead.table, "Row has no lead key, skipping lead insert");
            }
        }

        statements.push(SqlStatement::insert(&self.mapping.table, &values)?);
        Ok(statements)
    }
}

#[async_trait]
impl ResumableJob for RowLoadJob {
    type Item = CsvRow;

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_batch(&self, source: &SourceContext, _cursor: Option<&str>) -> IngestResult<WorkBatch<CsvRow>> {
        Ok(WorkBatch::materialized(load_rows(self.store.as_ref(), source).await?))
    }

    async fn process_item(&self, _source: &SourceContext, row: &CsvRow) -> IngestResult<ItemOutcome> {
        let broker_id = match &self.mapping.broker_lookup {
            Some(lookup) => Some(self.lookup_broker(lookup, row).await?),
            None => None,
        };

        let statements = self.row_statements(row, broker_id)?;
        self.warehouse.execute_all(&statements).await?;
        Ok(ItemOutcome::Processed)
    }

    fn describe_item(&self, row: &CsvRow) -> String {
        let key = self
            .mapping
            .columns
            .iter()
            .find(|column| column.target == self.mapping.key_column)
            .and_then(|column| column.source.as_deref())
            .and_then(|source| row.get(source));
        format!("row {}", key.unwrap_or("without key"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{RecordingTrigger, ResumableJobRunner, TriggerPayload};
    use crate::services::{InMemoryObjectStore, ObjectStore, RecordingWarehouse};
    use bytes::Bytes;
    use std::time::Duration;

    const CALLS: &[u8] = b"Call Id,Lead Id,Origin,Time,Call Duration (hrs:min:sec),User\n\
101,9001,Outbound,2024-11-19 10:00,0:01:23,\"Doe, Jane\"\n\
,9002,Inbound,2024-11-19 10:05,0:00:10,\"Roe, Rich\"\n\
103,,Inbound,2024-11-19 10:09,bad,\n";

    fn mapping() -> TableMapping {
        TableMapping {
            table: "public.call".into(),
            key_column: "call_id".into(),
            columns: vec![
                ColumnMapping::text("Call Id", "call_id"),
                ColumnMapping::constant("call_platform", "Velocify"),
                ColumnMapping::of_kind("Lead Id", "lead_id", ColumnKind::Integer),
                ColumnMapping::text("Origin", "call_type"),
                ColumnMapping::of_kind("Time", "date_time", ColumnKind::Timestamp),
                ColumnMapping::of_kind("Call Duration (hrs:min:sec)", "talk_time", ColumnKind::DurationSeconds),
            ],
            broker_lookup: Some(BrokerLookup {
                source: "User".into(),
                target: "broker_id".into(),
                table: default_broker_table(),
                id_column: default_id_column(),
                name_column: default_name_column(),
                id_type: SqlType::Text,
            }),
            lead_upsert: Some(LeadUpsert {
                table: "public.lead".into(),
                key_column: "lead_id".into(),
                columns: vec![
                    ColumnMapping::of_kind("Lead Id", "lead_id", ColumnKind::Integer),
                    ColumnMapping::constant("source", "Velocify"),
                    ColumnMapping::of_kind("Time", "creation_date", ColumnKind::Timestamp),
                ],
            }),
        }
    }

    async fn setup(warehouse: Arc<RecordingWarehouse>) -> (RowLoadJob, TriggerPayload) {
        let store = Arc::new(InMemoryObjectStore::new());
        store
            .put("velocify-calls", "calls.csv", Bytes::from_static(CALLS), "text/csv")
            .await
            .unwrap();
        let client = Arc::new(WarehouseClient::new(warehouse));
        let job = RowLoadJob::new("push-velocify-call-logs", store, client, mapping());
        (job, TriggerPayload::for_source(&SourceContext::new("velocify-calls", "calls.csv")))
    }

    #[tokio::test(start_paused = true)]
    async fn test_rows_become_parameterized_upserts() {
        let warehouse = Arc::new(RecordingWarehouse::new().respond_to("FROM public.broker", vec![vec![Some("7".into())]]));
        let (job, payload) = setup(warehouse.clone()).await;
        let runner = ResumableJobRunner::new(Arc::new(RecordingTrigger::new()), Duration::from_secs(840));

        let result = runner.run(&job, &payload).await;

        assert!(result.is_completed());
        assert_eq!(result.summary().processed, 2);
        assert_eq!(result.summary().failed, 1);

        let lookups = warehouse.executed_matching("ILIKE");
        assert_eq!(
            lookups[0].sql,
            "SELECT broker_id::text FROM public.broker WHERE broker_name ILIKE $1 LIMIT 1"
        );
        assert_eq!(lookups[0].params, vec![SqlValue::Text("Jane Doe".into())]);

        let inserts = warehouse.executed_matching("INSERT INTO public.call ");
        assert_eq!(inserts.len(), 2);
        assert_eq!(
            inserts[0].params,
            vec![
                SqlValue::Text("101".into()),
                SqlValue::Text("Velocify".into()),
                SqlValue::Integer(9001),
                SqlValue::Text("Outbound".into()),
                SqlValue::Timestamp(parse_timestamp("2024-11-19 10:00:00").unwrap()),
                SqlValue::Integer(83),
                SqlValue::Text("7".into()),
            ]
        );
        // Third row: no lead id, bad duration, no user
        assert_eq!(inserts[1].params[2], SqlValue::Null(SqlType::Integer));
        assert_eq!(inserts[1].params[5], SqlValue::Null(SqlType::Integer));
        assert_eq!(inserts[1].params[6], SqlValue::Null(SqlType::Text));

        let leads = warehouse.executed_matching("NOT EXISTS");
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].params[2].sql_type(), SqlType::Timestamp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerun_issues_same_delete_then_insert() {
        let warehouse = Arc::new(RecordingWarehouse::new());
        let (job, payload) = setup(warehouse.clone()).await;
        let runner = ResumableJobRunner::new(Arc::new(RecordingTrigger::new()), Duration::from_secs(840));

        runner.run(&job, &payload).await;
        let first: Vec<_> = warehouse.executed();
        runner.run(&job, &payload).await;
        let all = warehouse.executed();

        assert_eq!(all.len(), first.len() * 2);
        assert_eq!(&all[first.len()..], first.as_slice());
        let deletes = warehouse.executed_matching("DELETE FROM public.call");
        assert!(deletes.iter().all(|d| d.sql == "DELETE FROM public.call WHERE call_id = $1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_warehouse_failure_is_item_level() {
        let warehouse = Arc::new(RecordingWarehouse::new().fail_matching("INSERT INTO public.call "));
        let (job, payload) = setup(warehouse).await;
        let runner = ResumableJobRunner::new(Arc::new(RecordingTrigger::new()), Duration::from_secs(840));

        let result = runner.run(&job, &payload).await;
        assert!(result.is_completed());
        assert_eq!(result.summary().failed, 3);
    }

    #[tokio::test]
    async fn test_lead_is_inserted_before_the_row_referencing_it() {
        let warehouse = Arc::new(RecordingWarehouse::new());
        let (job, payload) = setup(warehouse.clone()).await;
        let runner = ResumableJobRunner::new(Arc::new(RecordingTrigger::new()), Duration::from_secs(840));
        runner.run(&job, &payload).await;

        let first_row: Vec<String> = warehouse.executed().into_iter().take(4).map(|s| s.sql).collect();
        assert!(first_row[0].contains("ILIKE"));
        assert!(first_row[1].starts_with("DELETE FROM public.call"));
        assert!(first_row[2].starts_with("INSERT INTO public.lead"));
        assert!(first_row[3].starts_with("INSERT INTO public.call"));
    }

    #[test]
    fn test_typed_extraction() {
        let rows = crate::jobs::csv_source::parse_rows(b"Time,Lead Id,Talk\n11/19/2024 10:00:05 AM, 12 ,\n").unwrap();
        let row = &rows[0];

        let at = ColumnMapping::of_kind("Time", "date_time", ColumnKind::Timestamp).extract(row);
        assert_eq!(at, SqlValue::Timestamp(parse_timestamp("2024-11-19 10:00:05").unwrap()));
        assert_eq!(
            ColumnMapping::of_kind("Lead Id", "lead_id", ColumnKind::Integer).extract(row),
            SqlValue::Integer(12)
        );
        assert_eq!(
            ColumnMapping::of_kind("Talk", "talk_time", ColumnKind::DurationSeconds).extract(row),
            SqlValue::Null(SqlType::Integer)
        );
        assert_eq!(
            ColumnMapping::of_kind("Missing", "creation_date", ColumnKind::Timestamp).extract(row),
            SqlValue::Null(SqlType::Timestamp)
        );
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_broker_id_follows_configured_type() {
        let mut lookup = mapping().broker_lookup.unwrap();
        assert_eq!(lookup.bind_id(Some("b-1".into())), SqlValue::Text("b-1".into()));
        assert_eq!(lookup.bind_id(None), SqlValue::Null(SqlType::Text));

        lookup.id_type = SqlType::Integer;
        assert_eq!(lookup.bind_id(Some("42".into())), SqlValue::Integer(42));
        assert_eq!(lookup.bind_id(Some("b-1".into())), SqlValue::Null(SqlType::Integer));
    }

    #[test]
    fn test_reorder_broker_name() {
        assert_eq!(reorder_broker_name("Doe, Jane"), "Jane Doe");
        assert_eq!(reorder_broker_name(" Jane Doe "), "Jane Doe");
        assert_eq!(reorder_broker_name("Doe,"), "Doe,");
    }

    #[test]
    fn test_mapping_validation() {
        assert!(mapping().validate().is_ok());

        let mut unmapped_key = mapping();
        unmapped_key.key_column = "id".into();
        assert!(unmapped_key.validate().is_err());

        let mut empty = mapping();
        empty.columns.clear();
        assert!(empty.validate().is_err());
    }
}
