//! # Ingestion Configuration
//!
//! Layered, validated configuration for the ingestion jobs.
//!
//! ## Layers
//!
//! 1. `base.yaml` in the configuration directory (required)
//! 2. `environments/{environment}.yaml` (optional)
//! 3. `INGEST__`-prefixed environment variables, `__` separating nesting levels
//!    (`INGEST__RUNTIME__TIME_BUDGET_SECONDS=600`)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use call_ingest::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let budget = manager.config().runtime.time_budget();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::{storage, telephony, timing};
use crate::jobs::{CallLogFetchSettings, RecordingDownloadSettings, StorageSweepSettings, TableMapping};
use crate::resilience::RetryPolicy;
use crate::telephony::TelephonyProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub runtime: RuntimeConfig,
    pub storage: StorageConfig,
    pub warehouse: WarehouseConfig,
    pub telephony: TelephonyConfig,
    /// Retry policy for jobs without their own
    pub retry: RetryPolicy,
    pub jobs: BTreeMap<String, JobConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub time_budget_seconds: u64,
    pub platform_timeout_seconds: u64,
    /// Base URL continuations are POSTed to; unset means in-process only
    pub invoke_url: Option<String>,
    /// Prepended to job names to form the deployed function name
    pub function_prefix: String,
    /// Per-request HTTP timeout; unset means the smallest budget margin
    pub http_timeout_seconds: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            time_budget_seconds: timing::DEFAULT_TIME_BUDGET_SECONDS,
            platform_timeout_seconds: timing::PLATFORM_TIMEOUT_SECONDS,
            invoke_url: None,
            function_prefix: String::new(),
            http_timeout_seconds: None,
        }
    }
}

impl RuntimeConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.time_budget_seconds)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    FileSystem,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root of the filesystem store; each container is a subdirectory
    pub root_dir: PathBuf,
    pub list_page_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::FileSystem,
            root_dir: PathBuf::from("./data"),
            list_page_size: storage::LIST_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Connection string; when unset it is read from `secret_name`, and when
    /// neither is set statements are only recorded and logged
    pub database_url: Option<String>,
    pub database: String,
    pub cluster_identifier: Option<String>,
    pub secret_name: Option<String>,
    pub secret_field: String,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub max_connections: u32,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database: "dev".to_string(),
            cluster_identifier: None,
            secret_name: None,
            secret_field: "database_url".to_string(),
            poll_interval_ms: timing::WAREHOUSE_POLL_INTERVAL_MS,
            max_poll_attempts: timing::WAREHOUSE_MAX_POLL_ATTEMPTS,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelephonyConfig {
    pub ringcentral: RingCentralConfig,
    pub callrail: CallRailConfig,
}

/// RingCentral access: every credential is read from one secret document,
/// unless `client_id`/`client_secret` are set here directly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingCentralConfig {
    pub base_url: String,
    pub secret_name: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub jwt_field: String,
}

impl Default for RingCentralConfig {
    fn default() -> Self {
        Self {
            base_url: telephony::RINGCENTRAL_BASE_URL.to_string(),
            secret_name: None,
            client_id: None,
            client_secret: None,
            jwt_field: "RingCentral/JWTToken".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallRailConfig {
    pub base_url: String,
    pub account_id: Option<String>,
    pub api_key_secret_name: Option<String>,
    pub api_key_secret_field: String,
    pub date_range: Option<String>,
}

impl Default for CallRailConfig {
    fn default() -> Self {
        Self {
            base_url: telephony::CALLRAIL_BASE_URL.to_string(),
            account_id: None,
            api_key_secret_name: None,
            api_key_secret_field: "api_key".to_string(),
            date_range: None,
        }
    }
}

/// What a configured job does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    CallLogFetch {
        provider: TelephonyProvider,
        settings: CallLogFetchSettings,
    },
    RecordingDownload {
        settings: RecordingDownloadSettings,
        /// Provider client used for authenticated downloads; plain HTTP when unset
        #[serde(default)]
        downloader: Option<TelephonyProvider>,
    },
    RowLoad {
        mapping: TableMapping,
    },
    StorageSweep {
        #[serde(default)]
        settings: StorageSweepSettings,
    },
}

impl JobKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::CallLogFetch { .. } => "call_log_fetch",
            Self::RecordingDownload { .. } => "recording_download",
            Self::RowLoad { .. } => "row_load",
            Self::StorageSweep { .. } => "storage_sweep",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub kind: JobKind,
    /// Overrides `runtime.time_budget_seconds`
    #[serde(default)]
    pub time_budget_seconds: Option<u64>,
    /// Overrides the top-level retry policy
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    /// Job started once, with the same source, when this job's chain starts fresh
    #[serde(default)]
    pub downstream_job: Option<String>,
    /// Source used when the payload names none
    #[serde(default)]
    pub source_container: Option<String>,
    #[serde(default)]
    pub source_key: Option<String>,
}

impl JobConfig {
    pub fn time_budget(&self, runtime: &RuntimeConfig) -> Duration {
        Duration::from_secs(self.time_budget_seconds.unwrap_or(runtime.time_budget_seconds))
    }

    pub fn retry_policy(&self, fallback: &RetryPolicy) -> RetryPolicy {
        self.retry.clone().unwrap_or_else(|| fallback.clone())
    }
}

impl IngestConfig {
    /// Timeout for one HTTP request
    ///
    /// A request started just before a job's budget runs out must finish
    /// before the platform timeout, so the default is the smallest margin any
    /// job leaves between its budget and that timeout.
    pub fn http_timeout(&self) -> Duration {
        let runtime = &self.runtime;
        if let Some(seconds) = runtime.http_timeout_seconds {
            return Duration::from_secs(seconds.max(1));
        }

        let margin = self
            .jobs
            .values()
            .filter_map(|job| job.time_budget_seconds)
            .chain(std::iter::once(runtime.time_budget_seconds))
            .map(|budget| runtime.platform_timeout_seconds.saturating_sub(budget))
            .min()
            .unwrap_or(0);
        Duration::from_secs(margin.max(1))
    }

    /// Reject configurations that would misbehave at runtime
    pub fn validate(&self) -> ConfigResult<()> {
        let runtime = &self.runtime;
        if runtime.time_budget_seconds >= runtime.platform_timeout_seconds {
            return Err(ConfigurationError::invalid_value(
                "runtime.time_budget_seconds",
                runtime.time_budget_seconds.to_string(),
                format!(
                    "must be below platform_timeout_seconds ({})",
                    runtime.platform_timeout_seconds
                ),
            ));
        }
        if runtime.http_timeout_seconds == Some(0) {
            return Err(ConfigurationError::invalid_value("runtime.http_timeout_seconds", "0", "must be positive"));
        }
        if self.storage.list_page_size == 0 {
            return Err(ConfigurationError::invalid_value("storage.list_page_size", "0", "must be positive"));
        }
        if self.warehouse.poll_interval_ms == 0 || self.warehouse.max_poll_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "warehouse.poll_interval_ms/max_poll_attempts",
                "0",
                "must be positive",
            ));
        }
        validate_retry("retry", &self.retry)?;

        for (name, job) in &self.jobs {
            self.validate_job(name, job)?;
        }
        Ok(())
    }

    fn validate_job(&self, name: &str, job: &JobConfig) -> ConfigResult<()> {
        let context = format!("jobs.{name}");

        if let Some(budget) = job.time_budget_seconds {
            if budget >= self.runtime.platform_timeout_seconds {
                return Err(ConfigurationError::invalid_value(
                    format!("{context}.time_budget_seconds"),
                    budget.to_string(),
                    "must be below the platform timeout",
                ));
            }
        }
        if let Some(retry) = &job.retry {
            validate_retry(&format!("{context}.retry"), retry)?;
        }
        if let Some(downstream) = &job.downstream_job {
            if !self.jobs.contains_key(downstream) {
                return Err(ConfigurationError::unknown_job(downstream, format!("{context}.downstream_job")));
            }
            if downstream == name {
                return Err(ConfigurationError::invalid_value(
                    format!("{context}.downstream_job"),
                    downstream,
                    "a job cannot start itself as downstream",
                ));
            }
        }

        match &job.kind {
            JobKind::CallLogFetch { settings, provider } => {
                if settings.page_size == 0 {
                    return Err(ConfigurationError::invalid_value(
                        format!("{context}.kind.settings.page_size"),
                        "0",
                        "must be positive",
                    ));
                }
                self.validate_provider(&context, *provider)?;
            }
            JobKind::RecordingDownload { downloader, .. } => {
                if let Some(provider) = downloader {
                    self.validate_provider(&context, *provider)?;
                }
            }
            JobKind::RowLoad { mapping } => {
                mapping
                    .validate()
                    .map_err(|e| ConfigurationError::validation_error(format!("{context}: {e}")))?;
            }
            JobKind::StorageSweep { .. } => {
                if job.source_container.is_none() {
                    return Err(ConfigurationError::missing_required_field("source_container", context));
                }
            }
        }
        Ok(())
    }

    fn validate_provider(&self, context: &str, provider: TelephonyProvider) -> ConfigResult<()> {
        match provider {
            TelephonyProvider::RingCentral => {
                if self.telephony.ringcentral.secret_name.is_none() {
                    return Err(ConfigurationError::missing_required_field(
                        "telephony.ringcentral.secret_name",
                        context,
                    ));
                }
            }
            TelephonyProvider::CallRail => {
                let cr = &self.telephony.callrail;
                if cr.account_id.is_none() || cr.api_key_secret_name.is_none() {
                    return Err(ConfigurationError::missing_required_field(
                        "telephony.callrail.account_id/api_key_secret_name",
                        context,
                    ));
                }
            }
        }
        Ok(())
    }
}

fn validate_retry(field: &str, retry: &RetryPolicy) -> ConfigResult<()> {
    if retry.multiplier < 1.0 {
        return Err(ConfigurationError::invalid_value(
            format!("{field}.multiplier"),
            retry.multiplier.to_string(),
            "must be at least 1.0",
        ));
    }
    Ok(())
}
