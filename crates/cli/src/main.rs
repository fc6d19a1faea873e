//! Runboard CLI
//!
//! `runboard serve` hosts the live dashboard; `runboard run` executes a
//! single run in the foreground and prints a summary.

mod config;
mod summary;

use anyhow::Context;
use clap::{Parser, Subcommand};
use runboard_core::catalog::Catalog;
use runboard_core::store::{RunStore, StoreConfig, StoreEvent};
use runboard_core::supervisor::{ProcessSupervisor, RunnerCommand, SupervisorConfig};
use runboard_core::types::RunStatus;
use runboard_server::transport::TransportConfig;
use runboard_server::AppState;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use config::RunboardConfig;

#[derive(Parser)]
#[command(name = "runboard", version, about = "Live test-run dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Host the dashboard server
    Serve {
        /// Path to the configuration file
        #[arg(long, env = "RUNBOARD_CONFIG", default_value = "runboard.toml")]
        config: PathBuf,

        /// Override the listen address from the config file
        #[arg(long, env = "RUNBOARD_LISTEN")]
        listen: Option<String>,
    },
    /// Execute one run in the foreground and print a summary
    Run {
        /// Path to the pre-generated test catalog (JSON)
        #[arg(long, default_value = "test-catalog.json")]
        catalog: PathBuf,

        /// The runner command to execute
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { config, listen } => serve(&config, listen).await,
        Commands::Run { catalog, command } => run_once(&catalog, command).await,
    }
}

async fn serve(config_path: &std::path::Path, listen: Option<String>) -> anyhow::Result<()> {
    let config = RunboardConfig::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let listen_addr = listen.unwrap_or_else(|| config.listen_addr.clone());
    let addr = listen_addr
        .parse()
        .with_context(|| format!("invalid listen address: {}", listen_addr))?;

    let store = RunStore::new(StoreConfig {
        log_capacity: config.log_capacity,
        ..StoreConfig::default()
    });
    let (catalog, source) = Catalog::load(&config.catalog_path)?;
    store.seed(catalog.scenarios(), source);

    let supervisor = ProcessSupervisor::new(
        store.clone(),
        SupervisorConfig {
            grace_period: Duration::from_secs(config.grace_period_secs),
            ..SupervisorConfig::default()
        },
    );

    let mut runner = RunnerCommand::new(&config.runner.program);
    runner.args = config.runner.args.clone();
    runner.env = config.runner.env.clone();
    runner.cwd = config.runner.cwd.clone();

    let state = AppState {
        store,
        supervisor,
        runner,
        transport: TransportConfig::default(),
    };
    runboard_server::serve(addr, state).await
}

async fn run_once(catalog_path: &std::path::Path, command: Vec<String>) -> anyhow::Result<()> {
    let store = RunStore::new(StoreConfig::default());
    let (catalog, source) = Catalog::load(catalog_path)?;
    store.seed(catalog.scenarios(), source);

    let supervisor = ProcessSupervisor::new(store.clone(), SupervisorConfig::default());

    let mut parts = command.into_iter();
    let Some(program) = parts.next() else {
        anyhow::bail!("no runner command given");
    };
    let mut runner = RunnerCommand::new(program);
    runner.args = parts.collect();

    // Subscribe before spawning so no log line is missed.
    let mut rx = store.subscribe();
    supervisor.spawn(runner).await?;

    let run = loop {
        match rx.recv().await {
            Ok(mutation) => match mutation.event {
                StoreEvent::Log { entry } => println!("{}", entry.content),
                StoreEvent::RunFinished { run } => break run,
                _ => {}
            },
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "log output fell behind; some lines not shown");
            }
            Err(RecvError::Closed) => break store.run(),
        }
    };

    summary::print_summary(&run, &store.scenarios());
    if run.status != RunStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}
