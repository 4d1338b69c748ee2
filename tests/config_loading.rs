//! The shipped configuration loads and validates in every environment.

use call_ingest::config::{ConfigManager, JobKind, StorageBackend};
use call_ingest::constants::timing::CALL_LOG_TIME_BUDGET_SECONDS;
use call_ingest::jobs::{ColumnKind, RecordingSource};
use call_ingest::telephony::TelephonyProvider;
use std::path::PathBuf;
use std::time::Duration;

fn config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/ingest")
}

#[test]
fn test_every_environment_loads() {
    for environment in ["development", "test", "production"] {
        let manager = ConfigManager::load_from_directory_with_env(Some(config_dir()), environment)
            .unwrap_or_else(|e| panic!("{environment}: {e}"));
        assert_eq!(manager.environment(), environment);
        assert_eq!(manager.config().jobs.len(), 6);
    }
}

#[test]
fn test_environment_overlays() {
    let test = ConfigManager::load_from_directory_with_env(Some(config_dir()), "test").unwrap();
    assert_eq!(test.config().storage.backend, StorageBackend::Memory);
    assert_eq!(test.config().runtime.time_budget(), Duration::from_secs(30));
    assert_eq!(test.config().warehouse.poll_interval_ms, 10);

    let production = ConfigManager::load_from_directory_with_env(Some(config_dir()), "production").unwrap();
    let config = production.config();
    assert_eq!(config.storage.backend, StorageBackend::FileSystem);
    assert!(config.runtime.invoke_url.is_some());
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.warehouse.secret_name.as_deref(), Some("warehouse/credentials"));
    assert_eq!(config.runtime.time_budget(), Duration::from_secs(840));
}

#[test]
fn test_shipped_jobs() {
    let manager = ConfigManager::load_from_directory_with_env(Some(config_dir()), "production").unwrap();
    let config = manager.config();

    let ringcentral = &config.jobs["process-ringcentral-data"];
    assert_eq!(
        ringcentral.time_budget(&config.runtime),
        Duration::from_secs(CALL_LOG_TIME_BUDGET_SECONDS)
    );
    assert!(matches!(
        ringcentral.kind,
        JobKind::CallLogFetch {
            provider: TelephonyProvider::RingCentral,
            ..
        }
    ));

    let velocify = &config.jobs["process-velocify-data"];
    assert_eq!(velocify.downstream_job.as_deref(), Some("push-velocify-call-logs"));
    match &velocify.kind {
        JobKind::RecordingDownload { settings, downloader } => {
            assert!(downloader.is_none());
            assert_eq!(
                settings.source,
                RecordingSource::CsvRows {
                    url_column: "Recording".to_string(),
                    id_column: "Call Id".to_string(),
                }
            );
        }
        other => panic!("unexpected kind {}", other.label()),
    }

    match &config.jobs["push-velocify-call-logs"].kind {
        JobKind::RowLoad { mapping } => {
            assert_eq!(mapping.table, "public.call");
            let broker = mapping.broker_lookup.as_ref().unwrap();
            assert_eq!(broker.name_column, "broker_name");
            assert_eq!(
                broker.statement("Doe, Jane").unwrap().sql,
                "SELECT broker_id::text FROM public.broker WHERE broker_name ILIKE $1 LIMIT 1"
            );
            let date_time = mapping.columns.iter().find(|c| c.target == "date_time").unwrap();
            assert_eq!(date_time.kind, ColumnKind::Timestamp);
            assert_eq!(mapping.lead_upsert.as_ref().map(|lead| lead.table.as_str()), Some("public.lead"));
        }
        other => panic!("unexpected kind {}", other.label()),
    }

    let sweep = &config.jobs["delete-old-velocify-recordings"];
    assert_eq!(sweep.source_container.as_deref(), Some("velocify-call-recordings"));
}

#[test]
fn test_debug_config_masks_connection_strings() {
    let manager = ConfigManager::load_from_directory_with_env(Some(config_dir()), "development").unwrap();
    let debug = manager.debug_config();

    let url = debug["warehouse"]["database_url"].as_str().unwrap();
    assert!(url.starts_with("[MASKED"));
    assert_eq!(debug["telephony"]["ringcentral"]["secret_name"], "ringcentral/credentials");
}
