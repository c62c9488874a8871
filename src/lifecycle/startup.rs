//! Startup orchestration.
//!
//! Order: store → components → listener → background tasks → serve.
//! Any error before serving is fatal.

use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::http::server::{AppState, HttpServer, StateError};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_listener;
use crate::store::{build_store, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Build the gateway and serve `upstream` behind it until a stop signal.
pub async fn run(config: GatewayConfig, upstream: Router) -> Result<(), StartupError> {
    let store = build_store(&config.store)?;
    tracing::info!(backend = store.backend(), "Store initialized");

    let bind_address = config.listener.bind_address.clone();
    let state = AppState::new(config, store)?;
    let server = HttpServer::new(state, upstream);

    let listener = TcpListener::bind(&bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: bind_address.clone(),
            source,
        })?;

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_listener(shutdown.clone());

    server.run(listener, &shutdown).await.map_err(StartupError::Serve)?;
    shutdown.trigger();
    Ok(())
}
