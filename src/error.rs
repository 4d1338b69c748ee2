//! # Ingestion Error Types
//!
//! Structured error taxonomy for the ingestion jobs using thiserror.
//!
//! Errors fall into two groups that the job runner treats very differently:
//!
//! - **Fatal** errors stop the current invocation with a `Failed` result. These come
//!   from resolving the work sequence (upstream listing, object fetch, secrets, config).
//! - **Item** errors are recovered locally: the runner logs them and moves on to the
//!   next work item.

use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Upstream fetch failed: {source_name}: status {status:?}: {message}")]
    UpstreamFetch {
        source_name: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Item processing failed for {item}: {message}")]
    ItemProcessing { item: String, message: String },

    #[error("Malformed input: {field}: {message}")]
    MalformedInput { field: String, message: String },

    #[error("Object storage error: {operation}: {message}")]
    Storage { operation: String, message: String },

    #[error("Warehouse error: {message}")]
    Warehouse {
        statement_id: Option<String>,
        message: String,
    },

    #[error("Warehouse statement {statement_id} ended in {status}: {message}")]
    StatementFailed {
        statement_id: String,
        status: String,
        message: String,
    },

    #[error("Secret retrieval failed: {name}: {message}")]
    Secret { name: String, message: String },

    #[error("Continuation trigger failed for job {job}: {message}")]
    Trigger { job: String, message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("HTTP error: {message}")]
    Http { message: String },
}

impl IngestError {
    /// Create an upstream fetch error
    pub fn upstream_fetch(
        source_name: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::UpstreamFetch {
            source_name: source_name.into(),
            status,
            message: message.into(),
        }
    }

    /// Create an item processing error
    pub fn item_processing(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ItemProcessing {
            item: item.into(),
            message: message.into(),
        }
    }

    /// Create a malformed input error
    pub fn malformed_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an object storage error
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a warehouse error not tied to a submitted statement
    pub fn warehouse(message: impl Into<String>) -> Self {
        Self::Warehouse {
            statement_id: None,
            message: message.into(),
        }
    }

    /// Create a warehouse error for a submitted statement
    pub fn warehouse_statement(statement_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Warehouse {
            statement_id: Some(statement_id.into()),
            message: message.into(),
        }
    }

    /// Create a statement failure error (FAILED / ABORTED)
    pub fn statement_failed(
        statement_id: impl Into<String>,
        status: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::StatementFailed {
            statement_id: statement_id.into(),
            status: status.into(),
            message: message.into(),
        }
    }

    /// Create a secret retrieval error
    pub fn secret(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Secret {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a continuation trigger error
    pub fn trigger(job: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Trigger {
            job: job.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an HTTP transport error
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    /// Whether the upstream rejected the call for rate limiting (HTTP 429)
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::UpstreamFetch { status: Some(429), .. })
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::serialization(err.to_string())
    }
}

impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        IngestError::malformed_input("csv", err.to_string())
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => IngestError::upstream_fetch(
                err.url().map(|u| u.to_string()).unwrap_or_default(),
                Some(status.as_u16()),
                err.to_string(),
            ),
            None => IngestError::http(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => IngestError::warehouse(db_err.to_string()),
            sqlx::Error::PoolTimedOut => IngestError::warehouse("connection pool timed out"),
            sqlx::Error::Configuration(config_err) => {
                IngestError::configuration("warehouse", config_err.to_string())
            }
            other => IngestError::warehouse(other.to_string()),
        }
    }
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::storage("io", err.to_string())
    }
}

/// Result type alias for ingestion operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let fetch_err = IngestError::upstream_fetch("call-log", Some(503), "unavailable");
        assert!(matches!(fetch_err, IngestError::UpstreamFetch { .. }));

        let item_err = IngestError::item_processing("row 12", "bad duration");
        assert!(matches!(item_err, IngestError::ItemProcessing { .. }));
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(IngestError::upstream_fetch("recording", Some(429), "slow down").is_rate_limited());
        assert!(!IngestError::upstream_fetch("recording", Some(404), "gone").is_rate_limited());
    }

    #[test]
    fn test_serde_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
        let err: IngestError = json_err.into();
        assert!(matches!(err, IngestError::Serialization { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = IngestError::statement_failed("abc", "ABORTED", "cancelled by user");
        let display = format!("{err}");
        assert!(display.contains("abc"));
        assert!(display.contains("ABORTED"));
        assert!(display.contains("cancelled by user"));
    }
}
