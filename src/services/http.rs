//! # HTTP Fetching
//!
//! Unauthenticated upstream GETs over the shared `reqwest::Client`, plus the
//! status check every upstream client applies to its responses. Rate-limit
//! retries belong to the caller's [`RetryPolicy`](crate::resilience::RetryPolicy).

use crate::error::{IngestError, IngestResult};
use crate::telephony::RecordingDownloader;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn get_bytes(&self, url: &str) -> IngestResult<Bytes> {
        debug!(url = %url, "HTTP GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::http(format!("GET {url}: {e}")))?;

        check_status(url, response).await?.bytes().await.map_err(IngestError::from)
    }
}

/// Map a non-2xx response to `UpstreamFetch`, keeping the status
pub(crate) async fn check_status(source: &str, response: reqwest::Response) -> IngestResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(IngestError::upstream_fetch(source, Some(status.as_u16()), body))
}

#[async_trait]
impl RecordingDownloader for HttpFetcher {
    async fn download(&self, location: &str) -> IngestResult<Bytes> {
        self.get_bytes(location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_bytes() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/recording.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3".to_vec()))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(reqwest::Client::new());
        let body = fetcher
            .get_bytes(&format!("{}/recording.mp3", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(body.as_ref(), b"ID3");
    }

    #[tokio::test]
    async fn test_non_success_keeps_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(reqwest::Client::new());
        let err = fetcher.get_bytes(&mock_server.uri()).await.unwrap_err();
        assert!(matches!(err, IngestError::UpstreamFetch { status: Some(404), .. }));
    }
}
