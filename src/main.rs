//! sqlgated - SQL gateway daemon
//!
//! Serves SQLite databases to remote clients over a framed TCP command
//! protocol with change-set postback.

use clap::Parser;
use sqlgate_server::{Config, Server};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlgated")]
#[command(about = "SQL gateway server")]
#[command(version)]
struct Args {
    /// Path to a YAML config file
    #[arg(short, long, env = "SQLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address (overrides the config file)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Directory database targets are confined to (overrides the config file)
    #[arg(long)]
    db_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration (flags override env overrides file)
    let loaded = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let mut config = match loaded {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    if let Some(bind) = args.bind {
        config.network.bind_addr = bind;
    }
    if let Some(root) = args.db_root {
        config.database.root_dir = Some(root);
    }

    // Initialize logging; RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    if let Some(path) = &args.config {
        tracing::info!("Loaded config from {}", path.display());
    }

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    tracing::info!("Starting sqlgate server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    match &config.database.root_dir {
        Some(root) => tracing::info!("  Database root: {}", root.display()),
        None => tracing::info!("  Database root: unrestricted"),
    }
    tracing::info!("  Idle timeout: {}s", config.network.idle_timeout_secs);
    tracing::info!("  Max connections: {}", config.network.max_connections);

    let server = Arc::new(Server::new(config));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    let stats = server.stats();
    tracing::info!(
        "Server stopped after {}s: {} connection(s), {} command(s), {} error(s)",
        stats.uptime().num_seconds(),
        stats.connections_total.load(Ordering::Relaxed),
        stats.commands_total.load(Ordering::Relaxed),
        stats.errors_total.load(Ordering::Relaxed)
    );
    Ok(())
}
