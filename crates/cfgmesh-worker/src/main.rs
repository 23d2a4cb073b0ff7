//! cfgmesh-worker — request-handling worker that applies hot-swapped
//! configuration for the cfgmesh control plane.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cfgmesh_worker::config::WorkerConfig;
use cfgmesh_worker::{router, WorkerState};

#[derive(Parser)]
#[command(name = "cfgmesh-worker")]
#[command(about = "Request-handling worker that applies hot-swapped configuration")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker HTTP server.
    Run {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write a starter config file for local development.
    InitConfig {
        #[arg(short, long, default_value = "./worker-config.json")]
        output: PathBuf,
    },

    /// Print the resolved configuration and exit.
    Info {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => run(config).await,
        Commands::InitConfig { output } => init_config(output),
        Commands::Info { config } => info_cmd(config),
    }
}

async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = WorkerConfig::load(config_path.as_deref())?;
    info!(addr = %config.addr, "starting cfgmesh-worker");

    let state = WorkerState::new(Duration::from_secs(config.request_timeout)).map_err(|e| {
        error!(error = %e, "failed to initialize worker state");
        e
    })?;

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.addr).await.map_err(|e| {
        error!(error = %e, addr = %config.addr, "failed to bind worker address");
        e
    })?;
    info!(addr = %config.addr, "worker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("worker shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}

fn init_config(output: PathBuf) -> anyhow::Result<()> {
    let config = WorkerConfig::default();
    config.save(&output)?;
    println!("Config written to {}", output.display());
    println!();
    println!("Run: cfgmesh-worker run --config {}", output.display());
    Ok(())
}

fn info_cmd(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = WorkerConfig::load(config_path.as_deref())?;
    println!("cfgmesh-worker v{}", env!("CARGO_PKG_VERSION"));
    println!("  addr:            {}", config.addr);
    println!("  request_timeout: {}s", config.request_timeout);
    Ok(())
}
