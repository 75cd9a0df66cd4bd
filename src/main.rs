//! Reverse-tunnel connector.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌───────────────────────────────────────────────────────────┐
//!                    │                        CONNECTOR                           │
//!                    │                                                            │
//!   Router ◄─────────┼── net::websocket ◄── pool (sliding window, backoff)        │
//!   (wss)   frames   │        │                                                   │
//!          ─────────►┼──► protocol::engine ──► backend::HyperForwarder ──────────┼──► Backend
//!                    │        ▲                        │                          │    (http)
//!                    │        └──── ResponseSink ◄─────┘                          │
//!                    │                                                            │
//!                    │  config · observability · lifecycle · resilience           │
//!                    └───────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use url::Url;

use tunnel_connector::config::{load_config, validate_config, ConfigError, ConnectorConfig};
use tunnel_connector::lifecycle::{spawn_signal_handler, Shutdown};
use tunnel_connector::observability::{logging, metrics};
use tunnel_connector::{ConnectorPool, HyperForwarder};

#[derive(Parser)]
#[command(name = "tunnel-connector")]
#[command(about = "Connects a private HTTP backend to tunnel routers", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Router URL; repeat to register with several routers. Replaces configured routers.
    #[arg(short, long)]
    router: Vec<String>,

    /// Backend origin, e.g. http://localhost:8080.
    #[arg(short, long)]
    target: Option<String>,
}

fn resolve_config(cli: &Cli) -> Result<ConnectorConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ConnectorConfig::default(),
    };
    if !cli.router.is_empty() {
        config.routers = cli.router.clone();
    }
    if let Some(target) = &cli.target {
        config.target = target.clone();
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    logging::init_logging(&config.observability)?;
    tracing::info!("tunnel-connector v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        routers = ?config.routers,
        target = %config.target,
        component = %config.component.name,
        sliding_window = config.sliding_window,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let target = Url::parse(&config.target)?;
    let forwarder = Arc::new(HyperForwarder::new(
        target,
        Duration::from_secs(config.timeouts.connect_secs),
    ));
    let pool = ConnectorPool::new(&config, forwarder)?;
    let tracker = pool.tracker();

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    pool.run(shutdown).await;
    tracing::info!(open_sockets = tracker.open_count(), "Shutdown complete");
    Ok(())
}
