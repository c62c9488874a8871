//! HTTP server setup and the middleware pipeline.
//!
//! # Responsibilities
//! - Build every component from the validated configuration
//! - Assemble the ordered middleware chain around gateway routes and the
//!   caller-supplied upstream router
//! - Run background tasks (credential renewal, store purge) until shutdown
//! - Serve with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware::from_fn, middleware::from_fn_with_state, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::{authenticate, AuthError, ServiceCredential, TokenBlacklist, TokenValidator};
use crate::config::GatewayConfig;
use crate::health::{setup_health_router, HealthAggregator};
use crate::http::context::init_context;
use crate::http::request::make_request_span;
use crate::lifecycle::Shutdown;
use crate::permission::{authorize, PermissionDelegate};
use crate::security::{rate_limit, SlidingWindowLimiter};
use crate::session::{attach_session, setup_session_router, SessionManager};
use crate::store::Store;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum StateError {
    #[error("token validator: {0}")]
    Auth(#[from] AuthError),
}

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub store: Arc<dyn Store>,
    pub validator: Arc<TokenValidator>,
    pub blacklist: Arc<TokenBlacklist>,
    pub credential: Arc<ServiceCredential>,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub sessions: Arc<SessionManager>,
    pub permissions: Arc<PermissionDelegate>,
    pub health: Arc<HealthAggregator>,
}

impl AppState {
    /// Wire every component against one store.
    pub fn new(config: GatewayConfig, store: Arc<dyn Store>) -> Result<Self, StateError> {
        let validator = Arc::new(TokenValidator::from_config(&config.auth)?);
        let credential = Arc::new(ServiceCredential::issue(validator.clone(), &config.auth)?);
        let blacklist = Arc::new(TokenBlacklist::new(store.clone()));
        let op_timeout = Duration::from_millis(config.store.op_timeout_ms);

        let limiter = Arc::new(SlidingWindowLimiter::new(
            store.clone(),
            config.rate_limit.clone(),
            op_timeout,
        ));
        let sessions = Arc::new(SessionManager::new(store.clone(), &config.session));
        let permissions = Arc::new(PermissionDelegate::new(&config.permission, Some(credential.clone())));
        let health = Arc::new(HealthAggregator::new(
            store.clone(),
            validator.clone(),
            blacklist.clone(),
            &config.health,
            &config.store,
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            validator,
            blacklist,
            credential,
            limiter,
            sessions,
            permissions,
            health,
        })
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(state: AppState, upstream: Router) -> Self {
        let router = Self::build_router(state.clone(), upstream);
        Self { router, state }
    }

    /// Gateway routes plus `upstream`, wrapped in the full middleware chain.
    ///
    /// Layers are listed innermost first.
    #[allow(deprecated)]
    pub fn build_router(state: AppState, upstream: Router) -> Router {
        let request_timeout = Duration::from_secs(state.config.timeouts.request_secs);

        Router::new()
            .merge(setup_health_router(state.clone()))
            .merge(setup_session_router(state.clone()))
            .merge(upstream)
            .layer(from_fn_with_state(state.clone(), attach_session))
            .layer(from_fn_with_state(state.clone(), authorize))
            .layer(from_fn_with_state(state.clone(), rate_limit))
            .layer(from_fn_with_state(state, authenticate))
            .layer(from_fn(init_context))
            .layer(TimeoutLayer::new(request_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        tokio::spawn(self.state.credential.clone().run(shutdown.subscribe()));
        tokio::spawn(purge_store(self.state.store.clone(), shutdown.subscribe()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut stop = shutdown.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Periodically evict expired entries held in process.
async fn purge_store(store: Arc<dyn Store>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = time::interval(PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = store.purge_expired();
                if evicted > 0 {
                    tracing::debug!(backend = store.backend(), evicted, "Purged expired store entries");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}
