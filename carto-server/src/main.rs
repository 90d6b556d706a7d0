//! Cartographer server
//!
//! Accepts coordinates on `POST /geo` and streams them to every WebSocket
//! subscriber on `GET /ws`.

use carto_core::config::ConfigStore;
use carto_server::config::{ConfigLoader, ConfigOverrides};
use carto_server::server::{build_router, run_server};
use carto_server::shutdown::{shutdown_signal, spawn_config_reload_handler};
use carto_server::state::AppState;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Cartographer - real-time coordinate fan-out server
#[derive(Parser, Debug)]
#[command(name = "carto-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file; built-in defaults are used without one
    #[arg(long, env = "CARTO_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen address (e.g., 0.0.0.0:8080)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Maximum number of ingestion requests served at once
    #[arg(short = 'c', long)]
    max_concurrent_requests: Option<usize>,

    /// Time allowed to write a frame to a subscriber, in milliseconds
    #[arg(long)]
    write_wait_ms: Option<u64>,

    /// Time allowed between pongs before a subscriber is dropped, in milliseconds
    #[arg(long)]
    pong_wait_ms: Option<u64>,

    /// How long ingested coordinates are served by /recent, in seconds
    #[arg(long)]
    event_ttl_secs: Option<u64>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            listen: self.listen,
            max_concurrent_requests: self.max_concurrent_requests,
            write_wait_ms: self.write_wait_ms,
            pong_wait_ms: self.pong_wait_ms,
            event_ttl_secs: self.event_ttl_secs,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting carto-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(args.config.as_ref(), args.overrides()));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    match config_loader.path() {
        Some(path) => tracing::info!("Configuration loaded from {:?}", path),
        None => tracing::info!("No configuration file given, using defaults"),
    }

    let listen_addr = loaded_config.server.listen;
    let max_concurrent_requests = loaded_config.server.max_concurrent_requests;
    tracing::info!(
        max_concurrent_requests,
        write_wait = ?loaded_config.liveness.write_wait,
        pong_wait = ?loaded_config.liveness.pong_wait,
        queue_capacity = loaded_config.events.queue_capacity,
        "Runtime settings"
    );

    // Sessions watch this to close themselves when the server stops
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create application state
    let liveness = ConfigStore::new(loaded_config.liveness);
    let state = AppState::new(
        &loaded_config.events,
        liveness.clone(),
        max_concurrent_requests,
        shutdown_rx.clone(),
    );

    // Spawn config reload handler (listens for SIGHUP)
    let reload_handler = spawn_config_reload_handler(liveness, config_loader, shutdown_rx);

    // Build the router
    let router = build_router(state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr, async move {
        shutdown_signal().await;
        shutdown_tx.send_replace(true);
    })
    .await;

    // The reload handler stops once the shutdown flag is set or its sender
    // is gone
    if let Err(e) = reload_handler.await {
        tracing::error!("Config reload handler failed: {}", e);
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
