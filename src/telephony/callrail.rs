//! CallRail call-log client.
//!
//! CallRail paginates by page number; the cursor is the next page number as a
//! string. Listing stops when a page comes back shorter than requested. The
//! `recording` field of a call points at a JSON descriptor whose `url` is the
//! actual audio.

use super::{CallLogPage, RecordingDownloader, TelephonyApi, TelephonyProvider};
use crate::constants::telephony::CALLRAIL_FIELDS;
use crate::error::{IngestError, IngestResult};
use crate::services::http::check_status;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const SOURCE: &str = "callrail";

#[derive(Debug, Deserialize)]
struct RecordingDescriptor {
    url: Option<String>,
}

pub struct CallRailClient {
    client: reqwest::Client,
    base_url: String,
    account_id: String,
    api_key: String,
    date_range: Option<String>,
}

impl CallRailClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        account_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account_id: account_id.into(),
            api_key: api_key.into(),
            date_range: None,
        }
    }

    /// Restrict listing to a named range such as `yesterday`
    pub fn with_date_range(mut self, date_range: Option<String>) -> Self {
        self.date_range = date_range;
        self
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header("Authorization", format!("Token token={}", self.api_key))
    }
}

fn parse_page(cursor: Option<&str>) -> IngestResult<u32> {
    match cursor {
        None => Ok(1),
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|page| *page >= 1)
            .ok_or_else(|| IngestError::malformed_input("cursor", format!("'{raw}' is not a page number"))),
    }
}

#[async_trait]
impl RecordingDownloader for CallRailClient {
    async fn download(&self, location: &str) -> IngestResult<Bytes> {
        let response = self
            .authorized(self.client.get(location))
            .send()
            .await
            .map_err(|e| IngestError::http(format!("GET {location}: {e}")))?;
        let descriptor: RecordingDescriptor = check_status(SOURCE, response).await?.json().await?;

        let Some(audio_url) = descriptor.url.filter(|url| !url.is_empty()) else {
            return Err(IngestError::item_processing(location, "recording descriptor has no url"));
        };

        let audio = self
            .client
            .get(&audio_url)
            .send()
            .await
            .map_err(|e| IngestError::http(format!("GET {audio_url}: {e}")))?;
        Ok(check_status(SOURCE, audio).await?.bytes().await?)
    }
}

#[async_trait]
impl TelephonyApi for CallRailClient {
    fn provider(&self) -> TelephonyProvider {
        TelephonyProvider::CallRail
    }

    async fn list_calls(&self, cursor: Option<&str>, page_size: u32) -> IngestResult<CallLogPage> {
        let page = parse_page(cursor)?;
        let url = format!("{}/v3/a/{}/calls.json", self.base_url, self.account_id);

        let mut query = vec![
            ("fields", CALLRAIL_FIELDS.to_string()),
            ("per_page", page_size.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(range) = &self.date_range {
            query.push(("date_range", range.clone()));
        }

        let response = self
            .authorized(self.client.get(&url))
            .query(&query)
            .send()
            .await
            .map_err(|e| IngestError::http(format!("GET {url}: {e}")))?;
        let body: Value = check_status(SOURCE, response).await?.json().await?;

        let records = match body.get("calls") {
            Some(Value::Array(calls)) => calls.clone(),
            _ => Vec::new(),
        };
        let total_pages = body.get("total_pages").and_then(Value::as_u64);
        let short_page = records.len() < page_size as usize;
        let last_page = total_pages.is_some_and(|total| u64::from(page) >= total);

        let next_cursor = (!short_page && !last_page).then(|| (page + 1).to_string());
        debug!(page, records = records.len(), has_next = next_cursor.is_some(), "Fetched CallRail page");

        Ok(CallLogPage { records, next_cursor })
    }

    fn recording_location(&self, call: &Value) -> Option<String> {
        call.get("recording")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> CallRailClient {
        CallRailClient::new(reqwest::Client::new(), server.uri(), "ACC1", "key")
    }

    #[tokio::test]
    async fn test_short_page_ends_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/a/ACC1/calls.json"))
            .and(query_param("page", "1"))
            .and(header("Authorization", "Token token=key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"calls": [{"id": "1"}, {"id": "2"}]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v3/a/ACC1/calls.json"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"calls": [{"id": "3"}]})))
            .mount(&server)
            .await;

        let client = client(&server);
        let first = client.list_calls(None, 2).await.unwrap();
        assert_eq!(first.next_cursor.as_deref(), Some("2"));

        let second = client.list_calls(Some("2"), 2).await.unwrap();
        assert_eq!(second.records.len(), 1);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_total_pages_ends_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"calls": [{"id": "1"}], "page": 1, "total_pages": 1})),
            )
            .mount(&server)
            .await;

        let page = client(&server).list_calls(None, 1).await.unwrap();
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_recording_descriptor_indirection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/recording/1"))
            .and(header("Authorization", "Token token=key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"url": format!("{}/audio/1.mp3", server.uri())})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/audio/1.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp3".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/recording/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = client(&server);
        let audio = client.download(&format!("{}/recording/1", server.uri())).await.unwrap();
        assert_eq!(audio.as_ref(), b"mp3");

        let err = client.download(&format!("{}/recording/2", server.uri())).await.unwrap_err();
        assert!(matches!(err, IngestError::ItemProcessing { .. }));
    }

    #[test]
    fn test_cursor_parsing() {
        assert_eq!(parse_page(None).unwrap(), 1);
        assert_eq!(parse_page(Some("7")).unwrap(), 7);
        assert!(parse_page(Some("0")).is_err());
        assert!(parse_page(Some("next")).is_err());
    }
}
