//! The `greenroom` binary: runs the edge process, the logic process, or
//! both in one runtime.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use greenroom::{AppConfig, EdgeServer, GreenroomError, LogicServer};

#[derive(Parser)]
#[command(name = "greenroom")]
#[command(about = "Room-based chat server with a hot-swappable logic process")]
#[command(version)]
struct Cli {
    /// Path to a JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the public edge process.
    Edge,
    /// Run the authoritative logic process.
    Logic,
    /// Run both processes in one runtime.
    Run,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "fatal");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), GreenroomError> {
    let config = match &cli.config {
        Some(path) => AppConfig::load(path).await?,
        None => AppConfig::default(),
    };

    match cli.command {
        Command::Edge => run_edge(config).await,
        Command::Logic => run_logic(config).await,
        Command::Run => run_both(config).await,
    }
}

async fn run_edge(config: AppConfig) -> Result<(), GreenroomError> {
    let mut edge =
        EdgeServer::new(config.edge_config(), config.channel_config());
    edge.start().await?;

    wait_for_shutdown().await;
    edge.stop().await?;
    Ok(())
}

/// Runs the logic process, restoring any snapshot left by the previous
/// generation and writing one on the way out.
async fn run_logic(config: AppConfig) -> Result<(), GreenroomError> {
    let persistence = config.server.persistence_file.clone();
    let control_addr = config.control_bind_addr();
    let mut logic = LogicServer::new(config.server, &control_addr);
    logic.start().await?;
    if tokio::fs::try_exists(&persistence).await.unwrap_or(false) {
        logic.restore_from(&persistence).await?;
    }

    wait_for_shutdown().await;
    logic.persist_to(&persistence).await?;
    logic.stop().await?;
    Ok(())
}

async fn run_both(config: AppConfig) -> Result<(), GreenroomError> {
    let persistence = config.server.persistence_file.clone();
    let mut logic = LogicServer::new(
        config.server.clone(),
        &config.control_bind_addr(),
    );
    logic.start().await?;
    if tokio::fs::try_exists(&persistence).await.unwrap_or(false) {
        logic.restore_from(&persistence).await?;
    }

    let mut edge =
        EdgeServer::new(config.edge_config(), config.channel_config());
    edge.start().await?;

    wait_for_shutdown().await;
    // Public side first, so clients see the close before the state goes.
    edge.stop().await?;
    logic.persist_to(&persistence).await?;
    logic.stop().await?;
    Ok(())
}

async fn wait_for_shutdown() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => {
            tracing::error!(error = %err, "shutdown signal listener failed");
        }
    }
}
