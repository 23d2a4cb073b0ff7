//! cfgmesh-controller — authoritative configuration store and agent-identity
//! issuer for the cfgmesh control plane.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cfgmesh_controller::config::ControllerConfig;
use cfgmesh_controller::{router, AppState};

#[derive(Parser)]
#[command(name = "cfgmesh-controller")]
#[command(about = "Authoritative configuration store for the cfgmesh control plane")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller HTTP server.
    Run {
        /// Path to a JSON config file; falls back to environment variables.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write a starter config file for local development.
    InitConfig {
        #[arg(short, long, default_value = "./controller-config.json")]
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
    let config = ControllerConfig::load(config_path.as_deref())?;
    info!(addr = %config.addr, state_dir = %config.state_dir.display(), "starting cfgmesh-controller");

    let addr = config.addr.clone();
    let state = AppState::load(config).await.map_err(|e| {
        error!(error = %e, "failed to initialize controller state");
        e
    })?;

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "failed to bind controller address");
        e
    })?;
    info!(addr = %addr, "controller listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("controller shut down cleanly");
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
    let config = ControllerConfig::default();
    config.save(&output)?;
    println!("Config written to {}", output.display());
    println!();
    println!("Edit admin_password/agent_password, then run:");
    println!("  cfgmesh-controller run --config {}", output.display());
    Ok(())
}

fn info_cmd(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = ControllerConfig::load(config_path.as_deref())?;
    println!("cfgmesh-controller v{}", env!("CARGO_PKG_VERSION"));
    println!("  addr:           {}", config.addr);
    println!("  state_dir:      {}", config.state_dir.display());
    println!("  poll_interval:  {}s", config.poll_interval);
    println!("  admin_user:     {}", config.admin_user);
    println!("  agent_user:     {}", config.agent_user);
    Ok(())
}
