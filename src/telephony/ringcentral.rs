//! RingCentral call-log client.
//!
//! Authenticates with the JWT bearer grant, lists voice calls with recordings,
//! and follows `navigation.nextPage.uri` as the cursor. The access token is
//! reused until it nears `expires_in` or a request is answered with 401.

use super::{CallLogPage, RecordingDownloader, TelephonyApi, TelephonyProvider};
use crate::constants::telephony::{
    RINGCENTRAL_CALL_LOG_PATH, RINGCENTRAL_DATE_FROM, RINGCENTRAL_JWT_GRANT, RINGCENTRAL_TOKEN_LIFETIME_SECONDS,
    RINGCENTRAL_TOKEN_PATH, RINGCENTRAL_TOKEN_REFRESH_MARGIN_SECONDS,
};
use crate::error::{IngestError, IngestResult};
use crate::services::http::check_status;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const SOURCE: &str = "ringcentral";

#[derive(Clone)]
pub struct RingCentralCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub jwt: String,
}

impl std::fmt::Debug for RingCentralCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingCentralCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[MASKED]")
            .field("jwt", &"[MASKED]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct AccessToken {
    value: String,
    refresh_at: Instant,
}

impl AccessToken {
    fn issued(response: TokenResponse) -> Self {
        let lifetime = response.expires_in.unwrap_or(RINGCENTRAL_TOKEN_LIFETIME_SECONDS);
        let usable = lifetime.saturating_sub(RINGCENTRAL_TOKEN_REFRESH_MARGIN_SECONDS);
        Self {
            value: response.access_token,
            refresh_at: Instant::now() + Duration::from_secs(usable),
        }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() < self.refresh_at
    }
}

pub struct RingCentralClient {
    client: reqwest::Client,
    base_url: String,
    credentials: RingCentralCredentials,
    access_token: Mutex<Option<AccessToken>>,
}

impl RingCentralClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, credentials: RingCentralCredentials) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            access_token: Mutex::new(None),
        }
    }

    /// The cached access token, exchanging the JWT for a new one when it is
    /// missing or about to expire
    pub async fn access_token(&self) -> IngestResult<String> {
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = AccessToken::issued(self.exchange_jwt().await?);
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn invalidate(&self, rejected: &str) {
        let mut cached = self.access_token.lock().await;
        // another request may already have refreshed it
        if cached.as_ref().is_some_and(|token| token.value == rejected) {
            *cached = None;
        }
    }

    async fn exchange_jwt(&self) -> IngestResult<TokenResponse> {
        let url = format!("{}{}", self.base_url, RINGCENTRAL_TOKEN_PATH);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .header("Accept", "application/json")
            .form(&[("grant_type", RINGCENTRAL_JWT_GRANT), ("assertion", self.credentials.jwt.as_str())])
            .send()
            .await
            .map_err(|e| IngestError::http(format!("token exchange: {e}")))?;

        let token: TokenResponse = check_status(SOURCE, response).await?.json().await?;
        info!(expires_in = ?token.expires_in, "Obtained RingCentral access token");
        Ok(token)
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> IngestResult<reqwest::Response> {
        let token = self.access_token().await?;
        let mut response = self.send_get(url, query, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(url = %url, "Access token rejected, refreshing");
            self.invalidate(&token).await;
            let token = self.access_token().await?;
            response = self.send_get(url, query, &token).await?;
        }
        check_status(SOURCE, response).await
    }

    async fn send_get(&self, url: &str, query: &[(&str, String)], token: &str) -> IngestResult<reqwest::Response> {
        self.client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| IngestError::http(format!("GET {url}: {e}")))
    }
}

#[async_trait]
impl RecordingDownloader for RingCentralClient {
    async fn download(&self, location: &str) -> IngestResult<Bytes> {
        Ok(self.get(location, &[]).await?.bytes().await?)
    }
}

#[async_trait]
impl TelephonyApi for RingCentralClient {
    fn provider(&self) -> TelephonyProvider {
        TelephonyProvider::RingCentral
    }

    async fn list_calls(&self, cursor: Option<&str>, page_size: u32) -> IngestResult<CallLogPage> {
        // The next-page URI already carries every query parameter
        let body: Value = match cursor {
            Some(next_page_uri) => self.get(next_page_uri, &[]).await?.json().await?,
            None => {
                let url = format!("{}{}", self.base_url, RINGCENTRAL_CALL_LOG_PATH);
                let query = [
                    ("perPage", page_size.to_string()),
                    ("type", "Voice".to_string()),
                    ("withRecording", "TRUE".to_string()),
                    ("dateFrom", RINGCENTRAL_DATE_FROM.to_string()),
                ];
                self.get(&url, &query).await?.json().await?
            }
        };

        let records = match body.get("records") {
            Some(Value::Array(records)) => records.clone(),
            _ => Vec::new(),
        };
        let next_cursor = body
            .pointer("/navigation/nextPage/uri")
            .and_then(Value::as_str)
            .filter(|uri| !uri.is_empty())
            .map(str::to_string);

        debug!(records = records.len(), has_next = next_cursor.is_some(), "Fetched RingCentral call-log page");
        Ok(CallLogPage { records, next_cursor })
    }

    fn recording_location(&self, call: &Value) -> Option<String> {
        call.pointer("/recording/contentUri")
            .and_then(Value::as_str)
            .filter(|uri| !uri.is_empty())
            .map(str::to_string)
    }
}
