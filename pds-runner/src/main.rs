//! PDS Runner
//!
//! Executes product delegation jobs locally with the execution engine.
//!
//! The binary wires the engine with its local collaborators:
//! - Configuration: runner settings from environment, products from the JSON file
//! - Job store: in-memory, lives as long as the process
//! - Workspace: local filesystem below the workspace root folder
//! - Processes: launcher scripts started with tokio
//!
//! `run` executes one job and prints the finished job as JSON, `status`
//! prints the execution queue snapshot.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pds_core::domain::configuration::{ExecutionParameterEntry, JobConfiguration, JobConfigurationData};
use pds_core::domain::job::Job;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use pds_runner::config::{Config, ServerConfiguration};
use pds_runner::execution::NoCancelDetection;
use pds_runner::messages::MessageCollector;
use pds_runner::process::TokioProcessLauncher;
use pds_runner::repository::{InMemoryJobStore, JobRepository};
use pds_runner::service::{ExecutionEnvironmentService, ExecutionService, StandardExecutionService};
use pds_runner::task::ExecutionServices;
use pds_runner::timeout::ProcessHandlingDataFactory;
use pds_runner::workspace::LocalWorkspaceService;

#[derive(Parser)]
#[command(name = "pds-runner")]
#[command(about = "Executes PDS product jobs locally", long_about = None)]
struct Cli {
    /// Product configuration file, overrides PDS_CONFIG_FILE
    #[arg(long, env = "PDS_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one job and print it as JSON once it ended
    Run {
        /// Product id from the configuration file
        #[arg(long)]
        product: String,

        /// Job parameter, may be repeated
        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,

        /// File whose content is stored as job metadata
        #[arg(long)]
        metadata: Option<PathBuf>,

        /// UUID of the SecHub job this job belongs to
        #[arg(long)]
        sechub_job: Option<Uuid>,
    },
    /// Print the execution queue status
    Status,
}

/// Engine wired with local collaborators
struct Runner {
    config: Config,
    store: Arc<InMemoryJobStore>,
    service: Arc<StandardExecutionService>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pds_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = load_config()?;
    if let Some(config_file) = cli.config_file {
        config.config_file = config_file;
    }
    info!(
        "Loaded configuration: queue_max={}, worker_pool_size={}, workspace_root={}",
        config.queue_max,
        config.worker_pool_size,
        config.workspace_root.display()
    );

    let runner = create_runner(config)?;

    match cli.command {
        Commands::Run {
            product,
            params,
            metadata,
            sechub_job,
        } => run_job(&runner, product, params, metadata, sechub_job).await,
        Commands::Status => print_status(&runner).await,
    }
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    let config = Config::from_env();
    config.validate()?;
    Ok(config)
}

fn create_runner(config: Config) -> Result<Runner> {
    let server_configuration = Arc::new(
        ServerConfiguration::load(&config.config_file)
            .context("Failed to load product configuration")?,
    );
    info!(
        "Server {} offers {} product(s)",
        server_configuration.server_id,
        server_configuration.products.len()
    );

    let store = Arc::new(InMemoryJobStore::new());
    let workspace_service = Arc::new(LocalWorkspaceService::new(
        &config.workspace_root,
        config.workspace_autoclean_disabled,
        Arc::clone(&server_configuration),
    ));
    let environment_service = Arc::new(ExecutionEnvironmentService::new(
        server_configuration,
        config.script_env_whitelist.as_deref(),
    ));

    let services = ExecutionServices {
        transaction_service: store.clone(),
        workspace_service,
        environment_service,
        process_launcher: Arc::new(TokioProcessLauncher::new()),
        process_handling_data_factory: ProcessHandlingDataFactory::from_config(&config),
        cancel_detection: Arc::new(NoCancelDetection),
        message_collector: MessageCollector::new(),
        stream_refresh_interval: config.stream_refresh_interval,
    };

    let service = Arc::new(StandardExecutionService::new(
        config.clone(),
        store.clone(),
        services,
    ));
    service.start_watcher();

    info!("Services initialized");

    Ok(Runner {
        config,
        store,
        service,
    })
}

async fn run_job(
    runner: &Runner,
    product: String,
    params: Vec<(String, String)>,
    metadata: Option<PathBuf>,
    sechub_job: Option<Uuid>,
) -> Result<()> {
    let meta_data = match metadata {
        Some(path) => Some(
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read metadata file {}", path.display()))?,
        ),
        None => None,
    };

    let job_configuration = JobConfiguration {
        product_id: product,
        sechub_job_uuid: sechub_job,
        parameters: params
            .into_iter()
            .map(|(key, value)| ExecutionParameterEntry::new(key, value))
            .collect(),
    };

    let job = Job::new(Uuid::new_v4());
    let job_uuid = job.uuid;
    runner.store.insert(
        job,
        JobConfigurationData {
            job_configuration,
            meta_data,
        },
    )?;

    runner.service.submit(job_uuid).await?;
    info!("Submitted job {}", job_uuid);

    let job = tokio::select! {
        job = wait_for_terminal_state(runner, job_uuid) => job?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down execution service");
            runner.service.shutdown().await?;
            load_job(runner, job_uuid).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&job)?);

    if !job.state.is_terminal() {
        anyhow::bail!("Job {} did not end, state is {:?}", job_uuid, job.state);
    }
    Ok(())
}

async fn wait_for_terminal_state(runner: &Runner, job_uuid: Uuid) -> Result<Job> {
    let mut ticker = time::interval(runner.config.watcher_interval);

    loop {
        ticker.tick().await;

        // without watcher nobody else reconciles the queue
        if !runner.config.watcher_enabled {
            runner.service.inspect_jobs_in_queue().await;
        }

        let job = load_job(runner, job_uuid).await?;
        if job.state.is_terminal() {
            info!("Job {} ended with state {:?}", job_uuid, job.state);
            return Ok(job);
        }
    }
}

async fn load_job(runner: &Runner, job_uuid: Uuid) -> Result<Job> {
    runner
        .store
        .find_by_id(job_uuid)
        .await?
        .with_context(|| format!("Job {} vanished from the job store", job_uuid))
}

async fn print_status(runner: &Runner) -> Result<()> {
    let status = runner.service.get_execution_status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);

    runner.service.shutdown().await?;
    Ok(())
}

/// Parses a `key=value` job parameter
fn parse_key_value(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", value)),
    }
}
