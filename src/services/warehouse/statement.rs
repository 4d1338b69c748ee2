//! Parameterized SQL statements.
//!
//! Values are always bound as `$n` parameters; only identifiers (table and
//! column names from configuration) are interpolated, and those are validated
//! first. Every value carries its SQL type, nulls included, so the server
//! never has to coerce a text parameter into a typed column.

use crate::error::{IngestError, IngestResult};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameter type of a bound value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    #[default]
    Text,
    Integer,
    Float,
    Bool,
    Timestamp,
}

/// A bound parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null(SqlType),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    pub fn sql_type(&self) -> SqlType {
        match self {
            SqlValue::Null(sql_type) => *sql_type,
            SqlValue::Integer(_) => SqlType::Integer,
            SqlValue::Float(_) => SqlType::Float,
            SqlValue::Bool(_) => SqlType::Bool,
            SqlValue::Text(_) => SqlType::Text,
            SqlValue::Timestamp(_) => SqlType::Timestamp,
        }
    }

    /// Text value, or a text `Null` for an empty or missing string
    pub fn text_or_null(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => SqlValue::Text(v.to_string()),
            _ => SqlValue::Null(SqlType::Text),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null(_) => f.write_str("NULL"),
            SqlValue::Integer(v) => write!(f, "{v}"),
            SqlValue::Float(v) => write!(f, "{v}"),
            SqlValue::Bool(v) => write!(f, "{v}"),
            SqlValue::Text(v) => write!(f, "'{v}'"),
            SqlValue::Timestamp(v) => write!(f, "'{v}'"),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        SqlValue::Timestamp(value)
    }
}

/// SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    /// `DELETE FROM {table} WHERE {column} = $1`
    pub fn delete_where(table: &str, column: &str, value: SqlValue) -> IngestResult<Self> {
        validate_identifier(table)?;
        validate_identifier(column)?;
        Ok(Self::new(format!("DELETE FROM {table} WHERE {column} = $1")).bind(value))
    }

    /// `INSERT INTO {table} (c1, c2, ...) VALUES ($1, $2, ...)`
    pub fn insert(table: &str, columns: &[(String, SqlValue)]) -> IngestResult<Self> {
        validate_identifier(table)?;
        if columns.is_empty() {
            return Err(IngestError::malformed_input(table, "insert without columns"));
        }

        let mut names = Vec::with_capacity(columns.len());
        let mut placeholders = Vec::with_capacity(columns.len());
        let mut statement = Self::new(String::new());
        for (position, (column, value)) in columns.iter().enumerate() {
            validate_identifier(column)?;
            names.push(column.as_str());
            placeholders.push(format!("${}", position + 1));
            statement = statement.bind(value.clone());
        }

        statement.sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            names.join(", "),
            placeholders.join(", ")
        );
        Ok(statement)
    }

    /// Insert a row unless one with the same `key_column` value already exists
    ///
    /// `key_column` must be one of `columns`.
    pub fn insert_if_absent(table: &str, key_column: &str, columns: &[(String, SqlValue)]) -> IngestResult<Self> {
        let insert = Self::insert(table, columns)?;
        validate_identifier(key_column)?;
        let key_position = columns
            .iter()
            .position(|(column, _)| column == key_column)
            .ok_or_else(|| IngestError::malformed_input(table, format!("key column {key_column} is not inserted")))?;

        let names: Vec<&str> = columns.iter().map(|(column, _)| column.as_str()).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|n| format!("${n}")).collect();
        Ok(Self {
            sql: format!(
                "INSERT INTO {table} ({}) SELECT {} WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE {key_column} = ${})",
                names.join(", "),
                placeholders.join(", "),
                key_position + 1
            ),
            params: insert.params,
        })
    }

    /// First column of the first row matching a case-insensitive pattern, as text
    pub fn lookup_ilike(table: &str, id_column: &str, match_column: &str, pattern: &str) -> IngestResult<Self> {
        validate_identifier(table)?;
        validate_identifier(id_column)?;
        validate_identifier(match_column)?;
        Ok(Self::new(format!(
            "SELECT {id_column}::text FROM {table} WHERE {match_column} ILIKE $1 LIMIT 1"
        ))
        .bind(pattern))
    }
}

impl fmt::Display for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.params.is_empty() {
            let rendered: Vec<String> = self.params.iter().map(ToString::to_string).collect();
            write!(f, " -- [{}]", rendered.join(", "))?;
        }
        Ok(())
    }
}

/// Accept `schema.table`, `"Quoted"` and plain snake_case identifiers only
pub fn validate_identifier(identifier: &str) -> IngestResult<()> {
    let mut chars = identifier.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '"');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '"'));

    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(IngestError::malformed_input(
            "identifier",
            format!("'{identifier}' is not a valid SQL identifier"),
        ))
    }
}
