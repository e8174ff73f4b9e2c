//! Content Gateway
//!
//! HTTP front end for a media engine.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request     ┌─────────┐    ┌──────────┐    ┌──────────────┐
//!     ──────────────────▶│  http   │───▶│ routing  │───▶│   session    │
//!                        │ server  │    │ handlers │    │   manager    │
//!                        └─────────┘    └──────────┘    └──────┬───────┘
//!                                                              │ activate
//!                                                              ▼
//!     Client Response    ┌─────────┐    ┌──────────┐    ┌──────────────┐
//!     ◀──────────────────│protocol │◀───│  proxy   │◀───│ media engine │
//!                        │responder│    │ (tunnel) │    │  (delivery)  │
//!                        └─────────┘    └──────────┘    └──────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use content_gateway::config::load_config;
use content_gateway::observability::{logging, metrics};
use content_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "content-gateway")]
#[command(about = "HTTP content gateway for a media engine", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;

    logging::init(&config.observability)?;
    tracing::info!("content-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        origin = %config.media.origin_url,
        handlers = config.handlers.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::from_config(&config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
