//! # Job Factory
//!
//! Turns the `jobs` section of an [`IngestConfig`] into bound, invocable jobs.
//! Provider clients are built once per provider from their secrets and shared
//! by every job that names the provider. A job whose provider cannot be built
//! is left out of the registry; the rest of the deployment still serves.

use super::JobRegistry;
use crate::config::{IngestConfig, JobConfig, JobKind};
use crate::error::{IngestError, IngestResult};
use crate::handler::ServiceHandles;
use crate::job::{BoundJob, InvocableJob, ResumableJob, ResumableJobRunner};
use crate::jobs::{CallLogFetchJob, RecordingDownloadJob, RowLoadJob, StorageSweepJob};
use crate::services::{secret_field, HttpFetcher};
use crate::telephony::{
    CallRailClient, RecordingDownloader, RingCentralClient, RingCentralCredentials, TelephonyApi, TelephonyProvider,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone)]
enum ProviderClient {
    RingCentral(Arc<RingCentralClient>),
    CallRail(Arc<CallRailClient>),
}

impl ProviderClient {
    fn api(&self) -> Arc<dyn TelephonyApi> {
        match self {
            Self::RingCentral(client) => client.clone(),
            Self::CallRail(client) => client.clone(),
        }
    }

    fn downloader(&self) -> Arc<dyn RecordingDownloader> {
        match self {
            Self::RingCentral(client) => client.clone(),
            Self::CallRail(client) => client.clone(),
        }
    }
}

/// Builds every configured job against one set of service handles
pub struct JobFactory<'a> {
    config: &'a IngestConfig,
    services: &'a ServiceHandles,
}

impl<'a> JobFactory<'a> {
    pub fn new(config: &'a IngestConfig, services: &'a ServiceHandles) -> Self {
        Self { config, services }
    }

    /// Instantiate and register every job that can be built
    ///
    /// Fails only when jobs are configured and none of them could be built.
    pub async fn build_registry(&self) -> IngestResult<JobRegistry> {
        let mut providers = HashMap::new();
        let mut registry = JobRegistry::new();
        let mut last_error = None;

        for (name, job_config) in &self.config.jobs {
            match self.build_job(name, job_config, &mut providers).await {
                Ok(job) => registry.register(job),
                Err(e) => {
                    error!(job = %name, kind = job_config.kind.label(), error = %e, "Job unavailable");
                    last_error = Some(e);
                }
            }
        }

        if registry.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        info!(jobs = registry.len(), skipped = self.config.jobs.len() - registry.len(), "Job registry built");
        Ok(registry)
    }

    async fn build_job(
        &self,
        name: &str,
        job_config: &JobConfig,
        providers: &mut HashMap<TelephonyProvider, ProviderClient>,
    ) -> IngestResult<Arc<dyn InvocableJob>> {
        let retry = job_config.retry_policy(&self.config.retry);
        let services = self.services;

        if job_config.downstream_job.is_some() && !matches!(job_config.kind, JobKind::RecordingDownload { .. }) {
            warn!(job = %name, kind = job_config.kind.label(), "downstream_job is only honored by recording_download jobs");
        }

        let job: Arc<dyn InvocableJob> = match &job_config.kind {
            JobKind::CallLogFetch { provider, settings } => {
                let client = self.provider_client(*provider, providers).await?;
                let job = CallLogFetchJob::new(name, client.api(), services.store.clone(), settings.clone())
                    .with_retry(retry);
                self.bind(job, job_config)
            }
            JobKind::RecordingDownload { settings, downloader } => {
                let downloader: Arc<dyn RecordingDownloader> = match downloader {
                    Some(provider) => self.provider_client(*provider, providers).await?.downloader(),
                    None => Arc::new(HttpFetcher::new(services.http_client.clone())),
                };
                let job = RecordingDownloadJob::new(name, services.store.clone(), downloader, settings.clone())
                    .with_retry(retry)
                    .with_downstream_job(job_config.downstream_job.clone());
                self.bind(job, job_config)
            }
            JobKind::RowLoad { mapping } => {
                let job = RowLoadJob::new(name, services.store.clone(), services.warehouse.clone(), mapping.clone());
                self.bind(job, job_config)
            }
            JobKind::StorageSweep { settings } => {
                let job = StorageSweepJob::new(name, services.store.clone(), settings.clone());
                self.bind(job, job_config)
            }
        };

        info!(
            job = %name,
            kind = job_config.kind.label(),
            budget_secs = job_config.time_budget(&self.config.runtime).as_secs(),
            "Built job"
        );
        Ok(job)
    }

    fn bind<J: ResumableJob + 'static>(&self, job: J, job_config: &JobConfig) -> Arc<dyn InvocableJob> {
        let runner = ResumableJobRunner::new(
            self.services.trigger.clone(),
            job_config.time_budget(&self.config.runtime),
        );
        Arc::new(
            BoundJob::new(job, runner)
                .with_source_defaults(job_config.source_container.clone(), job_config.source_key.clone()),
        )
    }

    async fn provider_client(
        &self,
        provider: TelephonyProvider,
        providers: &mut HashMap<TelephonyProvider, ProviderClient>,
    ) -> IngestResult<ProviderClient> {
        if let Some(client) = providers.get(&provider) {
            return Ok(client.clone());
        }

        let client = match provider {
            TelephonyProvider::RingCentral => ProviderClient::RingCentral(Arc::new(self.ringcentral_client().await?)),
            TelephonyProvider::CallRail => ProviderClient::CallRail(Arc::new(self.callrail_client().await?)),
        };
        providers.insert(provider, client.clone());
        Ok(client)
    }

    async fn ringcentral_client(&self) -> IngestResult<RingCentralClient> {
        let rc = &self.config.telephony.ringcentral;
        let secret_name = rc
            .secret_name
            .as_deref()
            .ok_or_else(|| IngestError::configuration("telephony.ringcentral", "secret_name is required"))?;
        let secret = self.services.secrets.get_secret(secret_name).await?;

        let client_id = match &rc.client_id {
            Some(id) => id.clone(),
            None => secret_field(&secret, "client_id")?,
        };
        let client_secret = match &rc.client_secret {
            Some(value) => value.clone(),
            None => secret_field(&secret, "client_secret")?,
        };
        let credentials = RingCentralCredentials {
            client_id,
            client_secret,
            jwt: secret_field(&secret, &rc.jwt_field)?,
        };

        Ok(RingCentralClient::new(
            self.services.http_client.clone(),
            rc.base_url.clone(),
            credentials,
        ))
    }

    async fn callrail_client(&self) -> IngestResult<CallRailClient> {
        let cr = &self.config.telephony.callrail;
        let (Some(account_id), Some(secret_name)) = (&cr.account_id, &cr.api_key_secret_name) else {
            return Err(IngestError::configuration(
                "telephony.callrail",
                "account_id and api_key_secret_name are required",
            ));
        };
        let secret = self.services.secrets.get_secret(secret_name).await?;
        let api_key = secret_field(&secret, &cr.api_key_secret_field)?;

        Ok(CallRailClient::new(
            self.services.http_client.clone(),
            cr.base_url.clone(),
            account_id.clone(),
            api_key,
        )
        .with_date_range(cr.date_range.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigManager;
    use crate::job::RecordingTrigger;
    use crate::jobs::CallLogFetchSettings;
    use crate::services::{InMemoryObjectStore, RecordingWarehouse, StaticSecretStore, WarehouseClient};
    use serde_json::json;
    use std::path::PathBuf;

    fn services(secrets: StaticSecretStore) -> ServiceHandles {
        ServiceHandles {
            store: Arc::new(InMemoryObjectStore::new()),
            secrets: Arc::new(secrets),
            warehouse: Arc::new(WarehouseClient::new(Arc::new(RecordingWarehouse::new()))),
            http_client: reqwest::Client::new(),
            trigger: Arc::new(RecordingTrigger::new()),
        }
    }

    fn shipped_config() -> IngestConfig {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/ingest");
        ConfigManager::load_from_directory_with_env(Some(dir), "test")
            .unwrap()
            .config()
            .clone()
    }

    fn provider_secrets() -> StaticSecretStore {
        StaticSecretStore::new()
            .with_secret(
                "ringcentral/credentials",
                json!({"client_id": "id", "client_secret": "secret", "RingCentral/JWTToken": "jwt"}),
            )
            .with_secret("callrail/credentials", json!({"api_key": "key"}))
    }

    #[tokio::test]
    async fn test_builds_every_shipped_job() {
        let config = shipped_config();
        let services = services(provider_secrets());

        let registry = JobFactory::new(&config, &services).build_registry().await.unwrap();

        assert_eq!(registry.len(), config.jobs.len());
        for name in config.jobs.keys() {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[tokio::test]
    async fn test_missing_provider_secret_leaves_other_jobs_available() {
        let config = shipped_config();
        let secrets = StaticSecretStore::new().with_secret("callrail/credentials", json!({"api_key": "key"}));
        let services = services(secrets);

        let registry = JobFactory::new(&config, &services).build_registry().await.unwrap();

        let ringcentral_jobs: Vec<&String> = config
            .jobs
            .iter()
            .filter(|(_, job)| {
                matches!(
                    job.kind,
                    JobKind::CallLogFetch { provider: TelephonyProvider::RingCentral, .. }
                        | JobKind::RecordingDownload { downloader: Some(TelephonyProvider::RingCentral), .. }
                )
            })
            .map(|(name, _)| name)
            .collect();
        assert!(!ringcentral_jobs.is_empty());
        for name in config.jobs.keys() {
            assert_eq!(registry.contains(name), !ringcentral_jobs.contains(&name), "{name}");
        }
        assert!(registry.contains("push-velocify-call-logs"));
        assert!(registry.contains("process-velocify-data"));
    }

    #[tokio::test]
    async fn test_build_fails_when_no_job_can_be_built() {
        let mut config = IngestConfig::default();
        config.telephony.ringcentral.secret_name = Some("rc".to_string());
        config.jobs.insert(
            "fetch".to_string(),
            JobConfig {
                kind: JobKind::CallLogFetch {
                    provider: TelephonyProvider::RingCentral,
                    settings: CallLogFetchSettings {
                        info_container: "info".to_string(),
                        recordings_container: "recordings".to_string(),
                        page_size: 10,
                        recording_delay_ms: 0,
                    },
                },
                time_budget_seconds: None,
                retry: None,
                downstream_job: None,
                source_container: None,
                source_key: None,
            },
        );
        let services = services(StaticSecretStore::new());

        let err = JobFactory::new(&config, &services).build_registry().await.err().unwrap();
        assert!(matches!(err, IngestError::Secret { .. }));
    }

    #[tokio::test]
    async fn test_client_id_from_config_overrides_secret() {
        let mut config = IngestConfig::default();
        config.telephony.ringcentral.secret_name = Some("rc".to_string());
        config.telephony.ringcentral.client_id = Some("configured".to_string());
        config.telephony.ringcentral.client_secret = Some("configured-secret".to_string());
        let services = services(StaticSecretStore::new().with_secret("rc", json!({"RingCentral/JWTToken": "jwt"})));

        let factory = JobFactory::new(&config, &services);
        assert!(factory.ringcentral_client().await.is_ok());
    }
}
