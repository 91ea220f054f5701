//! CLI binary for the replicator.

use clap::Parser;
use simple_replicator::{logging, Orchestrator, ReplicatorConfig, RowLedger, Store};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Simple Replicator - converges SQLite stores to the union of their rows.
#[derive(Parser, Debug)]
#[command(name = "simple-replicator")]
#[command(about = "Converges SQLite stores to the union of their rows")]
struct Args {
    /// Configuration file (YAML or JSON)
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Run a single pass even if an interval is configured
    #[arg(long)]
    once: bool,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match ReplicatorConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let level = args.log_level.as_deref().unwrap_or(&config.loglevel);
    if let Err(e) = logging::init(level) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config, args.once).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ReplicatorConfig, once: bool) -> simple_replicator::Result<()> {
    info!(
        stores = config.databases.len(),
        driver = %config.driver,
        ledger = config.ledger.enabled,
        "Starting replicator"
    );

    let mut stores = Vec::with_capacity(config.databases.len());
    for db in &config.databases {
        match Store::connect(db, config.driver_for(db), &config.settings).await {
            Ok(store) => stores.push(store),
            Err(e) => {
                close_stores(&stores).await;
                return Err(e);
            }
        }
    }

    let mut orchestrator = Orchestrator::new(config.clone());
    if config.ledger.enabled {
        match RowLedger::open(&config.ledger.sqlite_path).await {
            Ok(ledger) => orchestrator = orchestrator.with_ledger(ledger),
            Err(e) => {
                close_stores(&stores).await;
                return Err(e);
            }
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping after the current pass");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!(error = %e, "Unable to listen for interrupt"),
        }
        // A dropped sender reads as shutdown.
        std::future::pending::<()>().await;
    });

    let result = if once {
        orchestrator.run_pass(&stores).await.map(|report| {
            info!(
                pairs = report.pairs.len(),
                inserted = report.total_inserted(),
                failed = report.failed_pairs().count(),
                "Single pass finished"
            );
        })
    } else {
        orchestrator.run(&stores, shutdown_rx).await.map(|passes| {
            info!(passes, "Replicator finished");
        })
    };

    orchestrator.close().await;
    close_stores(&stores).await;
    result
}

async fn close_stores(stores: &[Store]) {
    for store in stores {
        store.close().await;
    }
}
