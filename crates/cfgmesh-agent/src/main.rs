//! cfgmesh-agent — per-host registration, polling, and forwarding agent
//! for the cfgmesh control plane.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cfgmesh_agent::{Agent, AgentConfig};

#[derive(Parser)]
#[command(name = "cfgmesh-agent")]
#[command(about = "Per-host registration, polling, and forwarding agent for the cfgmesh control plane")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register with the controller, then poll and forward indefinitely.
    Run {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write a starter config file for local development.
    InitConfig {
        #[arg(short, long, default_value = "./agent-config.json")]
        output: PathBuf,
    },

    /// Print the resolved configuration (minus secrets) and exit.
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
    let config = AgentConfig::load(config_path.as_deref()).map_err(|e| {
        error!(error = %e, "failed to load agent config");
        e
    })?;
    info!(
        controller_url = %config.controller_url,
        worker_url = %config.worker_url,
        "starting cfgmesh-agent"
    );

    let agent = Agent::new(config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let watcher = tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    agent.register(shutdown_rx.clone()).await.map_err(|e| {
        error!(error = %e, "registration failed permanently");
        e
    })?;

    agent.run(shutdown_rx).await;
    watcher.abort();

    info!("agent shut down cleanly");
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
    let config = AgentConfig::default();
    config.save(&output)?;
    println!("Config written to {}", output.display());
    println!();
    println!("Edit controller_url/worker_url/agent_password, then run:");
    println!("  cfgmesh-agent run --config {}", output.display());
    Ok(())
}

fn info_cmd(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = AgentConfig::load(config_path.as_deref())?;
    println!("cfgmesh-agent v{}", env!("CARGO_PKG_VERSION"));
    println!("  controller_url: {}", config.controller_url);
    println!("  worker_url:     {}", config.worker_url);
    println!("  poll_interval:  {}s", config.poll_interval);
    println!("  agent_hostname: {}", config.agent_hostname);
    println!("  heartbeat:      {}", config.heartbeat_enabled);
    Ok(())
}
