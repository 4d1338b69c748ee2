//! # call-ingest
//!
//! Command-line entry point for running ingestion jobs outside the hosting
//! platform: single invocations, whole chains driven in-process, configuration
//! checks, and the one-shot CSV/JSON utilities.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use call_ingest::config::ConfigManager;
use call_ingest::constants::storage::{CSV_CONTENT_TYPE, DEFAULT_ROWS_PER_FILE};
use call_ingest::handler::{InvocationHandler, LocalChainDriver, ServiceHandles};
use call_ingest::job::{ChannelTrigger, ContinuationTrigger, RecordingTrigger, TriggerPayload};
use call_ingest::logging::init_structured_logging;
use call_ingest::registry::JobFactory;
use call_ingest::services::EnvSecretStore;
use call_ingest::transform::{export_json_objects, remap_columns, split_csv};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "call-ingest")]
#[command(about = "Run resumable call ingestion jobs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory (default: config/ingest)
    #[arg(long, env = "INGEST_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Environment overlay to apply (development, test, production)
    #[arg(short, long, env = "INGEST_ENV")]
    environment: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single invocation and print the response
    Invoke {
        job: String,

        /// Trigger payload as JSON; omitted means a fresh start
        #[arg(long)]
        payload: Option<String>,
    },

    /// Run a whole chain in-process, feeding continuations back in
    RunChain {
        job: String,

        #[arg(long)]
        payload: Option<String>,

        #[arg(long, default_value_t = 100)]
        max_invocations: usize,
    },

    /// Load, validate and print the masked configuration
    ValidateConfig,

    /// Split a CSV object into fixed-size parts, optionally remapping columns
    SplitCsv {
        #[arg(long)]
        container: String,

        #[arg(long)]
        key: String,

        /// Container for the parts (default: the source container)
        #[arg(long)]
        output_container: Option<String>,

        #[arg(long, default_value_t = DEFAULT_ROWS_PER_FILE)]
        rows_per_file: usize,

        /// Column mapping as `source=target`; repeat to keep several columns
        #[arg(long = "map", value_parser = parse_mapping)]
        mappings: Vec<(String, String)>,
    },

    /// Export selected fields of every JSON object in a container as one CSV
    ExportJson {
        #[arg(long)]
        container: String,

        /// Comma-separated field names
        #[arg(long, value_delimiter = ',', required = true)]
        fields: Vec<String>,

        #[arg(long)]
        output_container: String,

        #[arg(long)]
        output_key: String,
    },
}

fn parse_mapping(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((source, target)) if !source.is_empty() && !target.is_empty() => {
            Ok((source.to_string(), target.to_string()))
        }
        _ => Err(format!("expected source=target, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_structured_logging();
    let cli = Cli::parse();

    let environment = cli.environment.unwrap_or_else(ConfigManager::detect_environment);
    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir, &environment)
        .context("failed to load configuration")?;
    let config = manager.config();

    match cli.command {
        Commands::Invoke { job, payload } => {
            let trigger: Arc<dyn ContinuationTrigger> =
                match ServiceHandles::http_trigger(config, ServiceHandles::http_client(config)?) {
                    Some(trigger) => Arc::new(trigger),
                    None => {
                        info!("No invoke_url configured; continuations are reported, not dispatched");
                        Arc::new(RecordingTrigger::new())
                    }
                };
            let handler = build_handler(&manager, trigger).await?;

            let response = handler.handle(&job, payload.as_deref().unwrap_or_default()).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if response.status_code >= 500 {
                bail!("invocation of {job} failed");
            }
        }
        Commands::RunChain {
            job,
            payload,
            max_invocations,
        } => {
            let (trigger, receiver) = ChannelTrigger::new();
            let handler = build_handler(&manager, Arc::new(trigger)).await?;
            let payload = TriggerPayload::from_json(payload.as_deref().unwrap_or_default())?;

            let mut driver = LocalChainDriver::new(handler, receiver, max_invocations);
            let report = driver.run(&job, payload).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_complete() {
                bail!("chain for {job} did not complete ({} invocations)", report.invocations());
            }
        }
        Commands::ValidateConfig => {
            println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
            println!(
                "Configuration for '{}' is valid: {} jobs",
                manager.environment(),
                config.jobs.len()
            );
        }
        Commands::SplitCsv {
            container,
            key,
            output_container,
            rows_per_file,
            mappings,
        } => {
            let store = ServiceHandles::object_store(config);
            let mut body = store.get(&container, &key).await?.to_vec();
            if !mappings.is_empty() {
                body = remap_columns(&body, &mappings)?;
            }

            let target = output_container.unwrap_or(container);
            let chunks = split_csv(&body, &key, rows_per_file)?;
            for chunk in &chunks {
                store
                    .put(&target, &chunk.name, Bytes::from(chunk.body.clone()), CSV_CONTENT_TYPE)
                    .await?;
                info!(container = %target, key = %chunk.name, rows = chunk.rows, "Wrote CSV part");
            }
            println!("Wrote {} parts to {target}", chunks.len());
        }
        Commands::ExportJson {
            container,
            fields,
            output_container,
            output_key,
        } => {
            let store = ServiceHandles::object_store(config);
            let csv = export_json_objects(store.as_ref(), &container, &fields).await?;
            store
                .put(&output_container, &output_key, Bytes::from(csv), CSV_CONTENT_TYPE)
                .await?;
            println!("Exported {container} to {output_container}/{output_key}");
        }
    }

    Ok(())
}

async fn build_handler(manager: &ConfigManager, trigger: Arc<dyn ContinuationTrigger>) -> Result<InvocationHandler> {
    let config = manager.config();
    let services = ServiceHandles::from_config(config, Arc::new(EnvSecretStore::new()), trigger)
        .await
        .context("failed to build service handles")?;
    let registry = JobFactory::new(config, &services)
        .build_registry()
        .await
        .context("failed to build job registry")?;
    Ok(InvocationHandler::new(Arc::new(registry)))
}
