//! Configuration Loader
//!
//! Environment-aware loading: discovers the configuration directory, layers
//! the YAML files and environment variables with the `config` crate, and
//! validates the result before anything uses it.

use super::error::{ConfigResult, ConfigurationError};
use super::IngestConfig;
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "INGEST";
const CONFIG_DIR_VAR: &str = "INGEST_CONFIG_DIR";
const DEFAULT_CONFIG_DIR: &str = "config/ingest";
const SENSITIVE_PATTERNS: [&str; 6] = ["password", "secret", "api_key", "token", "credential", "database_url"];

/// Loaded, validated configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: IngestConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load from a directory with an explicit environment, without reading
    /// `INGEST_ENV`
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);
        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        let manager = ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        };

        debug!(config = %manager.debug_config(), "Configuration loaded");
        info!(
            environment = %environment,
            jobs = manager.config.jobs.len(),
            time_budget_seconds = manager.config.runtime.time_budget_seconds,
            "Configuration loaded successfully"
        );
        Ok(Arc::new(manager))
    }

    /// Wrap an already-built configuration (tests, embedding)
    pub fn from_config(config: IngestConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::new(),
        }))
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with secret-looking fields masked
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null);
        mask_sensitive(&mut value);
        value
    }

    pub fn detect_environment() -> String {
        crate::logging::get_environment()
    }

    fn default_config_directory() -> PathBuf {
        std::env::var(CONFIG_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_DIR))
    }

    fn load_and_merge_config(config_directory: &Path, environment: &str) -> ConfigResult<IngestConfig> {
        let base = config_directory.join("base.yaml");
        if !base.is_file() {
            return Err(ConfigurationError::config_file_not_found(base));
        }
        let overrides = config_directory
            .join("environments")
            .join(format!("{environment}.yaml"));
        if !overrides.is_file() {
            debug!(path = %overrides.display(), "No environment override file");
        }

        let layered = Config::builder()
            .add_source(File::from(base.as_path()).format(FileFormat::Yaml))
            .add_source(File::from(overrides.as_path()).format(FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(config_directory.display().to_string(), e))?;

        layered
            .try_deserialize::<IngestConfig>()
            .map_err(|e| ConfigurationError::load_error(config_directory.display().to_string(), e))
    }
}

/// Replace values of sensitive-looking keys, keeping a hint of the original
fn mask_sensitive(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                let sensitive = SENSITIVE_PATTERNS.iter().any(|pattern| key_lower.contains(pattern))
                    && !key_lower.ends_with("_name")
                    && !key_lower.ends_with("_field")
                    && !key_lower.ends_with("_column");

                match val {
                    serde_json::Value::String(s) if sensitive => {
                        let masked = if s.chars().count() > 4 {
                            let head: String = s.chars().take(2).collect();
                            let tail: String = s.chars().skip(s.chars().count() - 2).collect();
                            format!("{head}***{tail}")
                        } else {
                            "***".to_string()
                        };
                        *val = serde_json::Value::String(format!("[MASKED: {masked}]"));
                    }
                    _ => mask_sensitive(val),
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(mask_sensitive),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn write_config(dir: &Path, base: &str, env: Option<(&str, &str)>) {
        fs::write(dir.join("base.yaml"), base).unwrap();
        if let Some((name, body)) = env {
            fs::create_dir_all(dir.join("environments")).unwrap();
            fs::write(dir.join("environments").join(format!("{name}.yaml")), body).unwrap();
        }
    }

    #[test]
    fn test_environment_file_overrides_base() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "runtime:\n  time_budget_seconds: 840\nwarehouse:\n  database: dev\n",
            Some(("test", "runtime:\n  time_budget_seconds: 30\n")),
        );

        let manager = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test").unwrap();
        assert_eq!(manager.config().runtime.time_budget_seconds, 30);
        assert_eq!(manager.config().runtime.platform_timeout_seconds, 900);
        assert_eq!(manager.environment(), "test");
    }

    #[test]
    fn test_missing_base_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test").unwrap_err();
        assert!(matches!(err, ConfigurationError::ConfigFileNotFound { .. }));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "runtime:\n  time_budget_seconds: 1000\n", None);

        let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }

    #[test]
    fn test_mask_sensitive_fields() {
        let mut value = json!({
            "warehouse": {"database_url": "postgres://user:pw@host/db", "secret_name": "wh"},
            "telephony": {"ringcentral": {"client_secret": "abc", "jwt_field": "RingCentral/JWTToken"}}
        });
        mask_sensitive(&mut value);

        assert_eq!(value["warehouse"]["database_url"], "[MASKED: po***db]");
        assert_eq!(value["warehouse"]["secret_name"], "wh");
        assert_eq!(value["telephony"]["ringcentral"]["client_secret"], "[MASKED: ***]");
        assert_eq!(value["telephony"]["ringcentral"]["jwt_field"], "RingCentral/JWTToken");
    }
}
