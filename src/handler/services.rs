//! Collaborator handles shared by every job of a deployment.

use crate::config::{IngestConfig, StorageBackend, WarehouseConfig};
use crate::constants::timing;
use crate::error::{IngestError, IngestResult};
use crate::job::{ContinuationTrigger, HttpInvokeTrigger};
use crate::services::{
    secret_field, FileSystemObjectStore, InMemoryObjectStore, ObjectStore, PgWarehouseExecutor, RecordingWarehouse,
    SecretStore, WarehouseClient, WarehouseExecutor,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Injected collaborators, cloned into each job the factory builds
#[derive(Clone)]
pub struct ServiceHandles {
    pub store: Arc<dyn ObjectStore>,
    pub secrets: Arc<dyn SecretStore>,
    pub warehouse: Arc<WarehouseClient>,
    pub http_client: reqwest::Client,
    pub trigger: Arc<dyn ContinuationTrigger>,
}

impl ServiceHandles {
    /// Build handles from configuration, dispatching continuations through `trigger`
    pub async fn from_config(
        config: &IngestConfig,
        secrets: Arc<dyn SecretStore>,
        trigger: Arc<dyn ContinuationTrigger>,
    ) -> IngestResult<Self> {
        let http_client = Self::http_client(config)?;
        let store = Self::object_store(config);
        let executor = Self::warehouse_executor(&config.warehouse, secrets.as_ref()).await?;
        let warehouse = WarehouseClient::new(executor).with_polling(
            Duration::from_millis(config.warehouse.poll_interval_ms),
            config.warehouse.max_poll_attempts,
        );

        Ok(Self {
            store,
            secrets,
            warehouse: Arc::new(warehouse),
            http_client,
            trigger,
        })
    }

    /// Shared HTTP client whose requests cannot outlive an invocation
    pub fn http_client(config: &IngestConfig) -> IngestResult<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(concat!("call-ingest/", env!("CARGO_PKG_VERSION")))
            .timeout(config.http_timeout())
            .connect_timeout(Duration::from_secs(timing::HTTP_CONNECT_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| IngestError::http(format!("client build failed: {e}")))
    }

    /// The HTTP invoke trigger, when the deployment configures an invoke endpoint
    pub fn http_trigger(config: &IngestConfig, client: reqwest::Client) -> Option<HttpInvokeTrigger> {
        let runtime = &config.runtime;
        runtime.invoke_url.as_ref().map(|url| {
            HttpInvokeTrigger::new(client, url.clone()).with_function_prefix(runtime.function_prefix.clone())
        })
    }

    pub fn object_store(config: &IngestConfig) -> Arc<dyn ObjectStore> {
        let storage = &config.storage;
        match storage.backend {
            StorageBackend::FileSystem => {
                info!(root = %storage.root_dir.display(), "Using filesystem object store");
                Arc::new(FileSystemObjectStore::new(storage.root_dir.clone()).with_page_size(storage.list_page_size))
            }
            StorageBackend::Memory => {
                info!("Using in-memory object store");
                Arc::new(InMemoryObjectStore::with_page_size(storage.list_page_size))
            }
        }
    }

    async fn warehouse_executor(
        warehouse: &WarehouseConfig,
        secrets: &dyn SecretStore,
    ) -> IngestResult<Arc<dyn WarehouseExecutor>> {
        let database_url = match (&warehouse.database_url, &warehouse.secret_name) {
            (Some(url), _) => Some(url.clone()),
            (None, Some(secret_name)) => {
                let secret = secrets.get_secret(secret_name).await?;
                Some(secret_field(&secret, &warehouse.secret_field)?)
            }
            (None, None) => None,
        };

        match database_url {
            Some(url) => {
                info!(
                    database = %warehouse.database,
                    cluster = warehouse.cluster_identifier.as_deref().unwrap_or("-"),
                    "Using Postgres warehouse executor"
                );
                Ok(Arc::new(PgWarehouseExecutor::connect_lazy(&url, warehouse.max_connections)?))
            }
            None => {
                warn!("No warehouse connection configured; statements will be recorded, not executed");
                Ok(Arc::new(RecordingWarehouse::new()))
            }
        }
    }
}

impl std::fmt::Debug for ServiceHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandles").finish_non_exhaustive()
    }
}
