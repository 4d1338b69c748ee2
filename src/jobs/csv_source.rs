//! CSV objects as materialized work sequences.
//!
//! The whole object is parsed on every invocation; a row's offset in the file
//! (header excluded) is its position in the sequence.

use crate::error::IngestResult;
use crate::job::SourceContext;
use crate::services::ObjectStore;
use csv::StringRecord;
use std::sync::Arc;
use tracing::debug;

/// One data row, addressable by header name
#[derive(Debug, Clone)]
pub struct CsvRow {
    headers: Arc<StringRecord>,
    record: StringRecord,
}

impl CsvRow {
    /// Field under `column`, trimmed; `None` when absent or blank
    pub fn get(&self, column: &str) -> Option<&str> {
        let position = self.headers.iter().position(|header| header.trim() == column)?;
        self.record
            .get(position)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn len(&self) -> usize {
        self.record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }
}

/// Parse CSV bytes into rows; short rows are allowed and read as missing fields
pub fn parse_rows(body: &[u8]) -> IngestResult<Vec<CsvRow>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(body);
    let headers = Arc::new(reader.headers()?.clone());

    reader
        .records()
        .map(|record| {
            Ok(CsvRow {
                headers: Arc::clone(&headers),
                record: record?,
            })
        })
        .collect()
}

/// Fetch the source object and parse it
pub async fn load_rows(store: &dyn ObjectStore, source: &SourceContext) -> IngestResult<Vec<CsvRow>> {
    let container = source.require_container()?;
    let key = source.require_key()?;

    let body = store.get(container, key).await?;
    let rows = parse_rows(&body)?;
    debug!(container = %container, key = %key, rows = rows.len(), "Loaded CSV source");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryObjectStore;
    use bytes::Bytes;

    #[test]
    fn test_rows_by_header() {
        let rows = parse_rows(b"Call Id, Lead Id ,Recording\n1,L1,http://a\n2,,\n3\n").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("Lead Id"), Some("L1"));
        assert_eq!(rows[1].get("Lead Id"), None);
        assert_eq!(rows[2].get("Call Id"), Some("3"));
        assert_eq!(rows[2].get("Recording"), None);
        assert_eq!(rows[0].get("Unknown"), None);
    }

    #[tokio::test]
    async fn test_load_requires_source() {
        let store = InMemoryObjectStore::new();
        store
            .put("calls", "a.csv", Bytes::from_static(b"id\n1\n"), "text/csv")
            .await
            .unwrap();

        let rows = load_rows(&store, &SourceContext::new("calls", "a.csv")).await.unwrap();
        assert_eq!(rows.len(), 1);

        assert!(load_rows(&store, &SourceContext::default()).await.is_err());
        assert!(load_rows(&store, &SourceContext::new("calls", "missing.csv")).await.is_err());
    }
}
