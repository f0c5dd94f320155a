//! nrpti-sync: run the BCMI → NRPTI staged sync pipeline once.
//!
//! Configuration comes from the environment (and a `.env` file when present).
//! See `PipelineConfig::from_env` for the recognized variables.

use anyhow::Context;
use bridge_desktop::ReqwestHttpClient;
use bridge_traits::time::LogLevel;
use clap::{Parser, Subcommand};
use core_records::SchemaKind;
use core_runtime::config::PipelineConfig;
use core_runtime::events::EventBus;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_sync::{
    create_pool, DatabaseConfig, NrptiRepository, OrchestratorConfig, SqliteStagingStore,
    SqliteSyncRunRepository, StagingStore, SyncOrchestrator, SyncRun, SyncRunRepository,
};
use provider_bcmi::BcmiConnector;
use sqlx::SqlitePool;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "nrpti-sync")]
#[command(author, version, about = "Mirror BCMI mine records into NRPTI")]
#[command(propagate_version = true)]
struct Cli {
    /// Log output format (pretty, json, compact)
    #[arg(long, global = true, env = "NRPTI_SYNC_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once, resuming from the staging store
    Run,

    /// Clear the staging store, then run from a cold start
    Reseed,

    /// Show staged record counts and recent runs
    Status {
        /// Number of runs to show
        #[arg(short, long, default_value_t = 5)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut logging = LoggingConfig::default().with_level(if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });
    if let Some(format) = cli.log_format {
        logging = logging.with_format(format);
    }
    if let Err(e) = init_logging(logging) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli.command.unwrap_or(Commands::Run)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "nrpti-sync failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env().context("invalid configuration")?;

    let pool = create_pool(DatabaseConfig::new(&config.database_path))
        .await
        .with_context(|| format!("cannot open {}", config.database_path.display()))?;

    match command {
        Commands::Run => {
            let run = orchestrator(&config, pool)?.run().await?;
            print_run(&run);
        }
        Commands::Reseed => {
            let run = orchestrator(&config, pool)?.reseed().await?;
            print_run(&run);
        }
        Commands::Status { limit } => status(pool, limit).await?,
    }

    Ok(())
}

fn orchestrator(config: &PipelineConfig, pool: SqlitePool) -> anyhow::Result<SyncOrchestrator> {
    let http_client = Arc::new(ReqwestHttpClient::with_timeout(config.http_timeout)?);

    let registry = BcmiConnector::new(http_client.clone(), config.registry_base_url.clone())
        .with_timeout(config.http_timeout);
    let repository = NrptiRepository::new(http_client, config.repository_base_url.clone())
        .with_token(config.repository_token.clone())
        .with_timeout(config.http_timeout);

    info!(
        registry = %config.registry_base_url,
        repository = %config.repository_base_url,
        data_source = %config.data_source,
        "Pipeline configured"
    );

    Ok(SyncOrchestrator::new(
        OrchestratorConfig::from_pipeline(config),
        Arc::new(registry),
        Arc::new(SqliteStagingStore::new(pool.clone())),
        Arc::new(repository),
        Arc::new(SqliteSyncRunRepository::new(pool)),
        Arc::new(EventBus::new(256)),
    ))
}

async fn status(pool: SqlitePool, limit: u32) -> anyhow::Result<()> {
    let store = SqliteStagingStore::new(pool.clone());
    let runs = SqliteSyncRunRepository::new(pool);

    println!("Staged records:");
    for kind in SchemaKind::ALL {
        println!("  {:<12} {}", kind, store.count(kind).await?);
    }

    let history = runs.history(limit).await?;
    if history.is_empty() {
        println!("No runs recorded");
        return Ok(());
    }

    println!("Recent runs:");
    for run in &history {
        println!(
            "  {}  {:<10} staged={} promoted={} skipped={}{}",
            run.id,
            run.status,
            run.counters.total_staged(),
            run.counters.records_promoted,
            run.counters.records_skipped,
            run.error_message
                .as_deref()
                .map(|m| format!("  error: {}", m))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn print_run(run: &SyncRun) {
    println!(
        "Run {} {}: {} mines, {} collections, {} documents staged; {} promoted, {} skipped",
        run.id,
        run.status,
        run.counters.mines_staged,
        run.counters.collections_staged,
        run.counters.documents_staged,
        run.counters.records_promoted,
        run.counters.records_skipped,
    );
}
