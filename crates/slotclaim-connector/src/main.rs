//! slotclaim connector binary.
//!
//! Usage:
//!   slotclaim-connector [OPTIONS]
//!
//! Options:
//!   -c, --config <PATH>     Path to configuration TOML file
//!   --rpc-bind <ADDR>       JSON-RPC bind address (default: 127.0.0.1:9470)
//!   --log-level <LEVEL>     Log level filter (default: info)
//!   --autostart             Start a claim run immediately
//!   --no-rpc                Do not open the control socket

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use slotclaim_connector::{ClaimService, ConnectorConfig, RpcServer};
use slotclaim_network::JsonLineTransport;
use slotclaim_state::JsonFileStore;

#[derive(Parser, Debug)]
#[command(
    name = "slotclaim-connector",
    about = "Coordinates scout and claimant identities against a contested slot service",
    version
)]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON-RPC bind address.
    #[arg(long)]
    rpc_bind: Option<String>,

    /// Log level filter (overridden by RUST_LOG).
    #[arg(long)]
    log_level: Option<String>,

    /// Start a claim run immediately.
    #[arg(long)]
    autostart: bool,

    /// Do not open the JSON-RPC control socket.
    #[arg(long)]
    no_rpc: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(ConnectorConfig::default_path);
    let loaded = ConnectorConfig::read(&config_path)?;
    let config_found = loaded.is_some();
    let mut config = loaded.unwrap_or_default();
    if let Some(bind) = cli.rpc_bind {
        config.rpc.bind_addr = bind;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if !config_found {
        tracing::info!(path = %config_path.display(), "Config file not found, using defaults");
    }

    tracing::info!(
        config = %config_path.display(),
        endpoint = %config.service.endpoint,
        claimants = config.claimants.len(),
        scouts = config.scouts.len(),
        "Starting slotclaim connector"
    );

    let transport = Arc::new(JsonLineTransport::new(config.service.endpoint.clone()));
    let store = Arc::new(JsonFileStore::new(config.storage.stats_path.clone()));
    let rpc_bind = config.rpc.bind_addr.clone();
    let max_connections = config.rpc.max_connections;
    let service = Arc::new(ClaimService::new(config, transport, store));

    if cli.autostart {
        service.start().await;
    }

    let rpc_task = if cli.no_rpc {
        None
    } else {
        let server = RpcServer::new(rpc_bind, Arc::clone(&service), max_connections);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                tracing::error!(error = %e, "RPC server error");
            }
        }))
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    service.stop().await;
    service.wait().await;
    if let Some(task) = rpc_task {
        task.abort();
    }
    Ok(())
}
