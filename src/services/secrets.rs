//! Secret lookup for upstream credentials.

use crate::error::{IngestError, IngestResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret document by name
    async fn get_secret(&self, name: &str) -> IngestResult<Value>;
}

/// Reads secrets from environment variables holding JSON documents
///
/// `ringcentral/jwt` is looked up as `{PREFIX}RINGCENTRAL_JWT`. A value that is
/// not valid JSON is returned as a plain string.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn variable_name(&self, name: &str) -> String {
        let normalized: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{}{}", self.prefix, normalized)
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> IngestResult<Value> {
        let variable = self.variable_name(name);
        let raw = std::env::var(&variable)
            .map_err(|_| IngestError::secret(name, format!("environment variable {variable} is not set")))?;

        Ok(serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
    }
}

/// Fixed secrets, for local runs and tests
#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, Value>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: Value) -> Self {
        self.secrets.insert(name.into(), value);
        self
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn get_secret(&self, name: &str) -> IngestResult<Value> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| IngestError::secret(name, "secret not found"))
    }
}

/// Extract a string field from a secret document by dotted path
///
/// An empty path returns the document itself when it is a plain string.
pub fn secret_field(secret: &Value, path: &str) -> IngestResult<String> {
    let mut current = secret;
    for segment in path.split('.').filter(|segment| !segment.is_empty()) {
        current = current
            .get(segment)
            .ok_or_else(|| IngestError::secret(path, format!("missing field '{segment}'")))?;
    }

    match current {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(IngestError::secret(path, format!("expected a string, found {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_variable_name_normalization() {
        let store = EnvSecretStore::with_prefix("INGEST_SECRET_");
        assert_eq!(store.variable_name("ringcentral/jwt-token"), "INGEST_SECRET_RINGCENTRAL_JWT_TOKEN");
    }

    #[tokio::test]
    async fn test_env_secret_parses_json() {
        let store = EnvSecretStore::with_prefix("CALL_INGEST_TEST_");
        std::env::set_var("CALL_INGEST_TEST_WAREHOUSE", r#"{"username":"loader","password":"pw"}"#);
        std::env::set_var("CALL_INGEST_TEST_PLAIN", "not-json");

        let doc = store.get_secret("warehouse").await.unwrap();
        assert_eq!(secret_field(&doc, "username").unwrap(), "loader");

        let plain = store.get_secret("plain").await.unwrap();
        assert_eq!(secret_field(&plain, "").unwrap(), "not-json");

        assert!(store.get_secret("absent").await.is_err());
    }

    #[test]
    fn test_secret_field_paths() {
        let doc = json!({"ringcentral": {"jwt": "abc", "port": 443}, "flag": true});
        assert_eq!(secret_field(&doc, "ringcentral.jwt").unwrap(), "abc");
        assert_eq!(secret_field(&doc, "ringcentral.port").unwrap(), "443");
        assert!(secret_field(&doc, "ringcentral.missing").is_err());
        assert!(secret_field(&doc, "flag").is_err());
    }

    #[tokio::test]
    async fn test_static_store() {
        let store = StaticSecretStore::new().with_secret("callrail", json!({"api_key": "k"}));
        assert!(store.get_secret("callrail").await.is_ok());
        assert!(matches!(store.get_secret("other").await, Err(IngestError::Secret { .. })));
    }
}
