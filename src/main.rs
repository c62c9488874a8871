//! Edge gateway
//!
//! Authentication and traffic control in front of backend services.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌───────────────────────────────────────────────────────────┐
//!                      │                      EDGE GATEWAY                         │
//!                      │                                                           │
//!   Client Request     │  ┌──────────┐   ┌──────────┐   ┌────────────┐             │
//!   ───────────────────┼─▶│ context  │──▶│   auth   │──▶│ rate limit │             │
//!                      │  │ + req id │   │ validator│   │  (store)   │             │
//!                      │  └──────────┘   └──────────┘   └─────┬──────┘             │
//!                      │                                      ▼                    │
//!                      │                 ┌──────────┐   ┌────────────┐             │
//!                      │                 │ session  │◀──│ permission │──▶ permission│
//!                      │                 │ (store)  │   │  delegate  │    service   │
//!                      │                 └────┬─────┘   └────────────┘             │
//!                      │                      ▼                                    │
//!   Client Response    │          health / session routes or upstream Router       │
//!   ◀──────────────────┼───────────────────────────────────────────────────────────┤
//!                      │                                                           │
//!                      │  Cross-cutting: config, observability, resilience,        │
//!                      │  lifecycle (startup/shutdown), store (memory / redis)     │
//!                      └───────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use edge_gateway::config::load_config;
use edge_gateway::http::default_upstream;
use edge_gateway::lifecycle;
use edge_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "edge-gateway")]
#[command(about = "Authentication and traffic-control gateway", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        store_backend = %config.store.backend,
        request_timeout_secs = config.timeouts.request_secs,
        route_rules = config.routes.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    lifecycle::run(config, default_upstream()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
