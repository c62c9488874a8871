//! Health, readiness and liveness.
//!
//! # Data Flow
//! ```text
//! GET /health → aggregator.rs (store, signing, session, blacklist, auth service)
//!             → status.rs (healthy / degraded / unhealthy)
//! GET /ready  → aggregator.rs (store, secret, signing round-trip)
//! GET /live   → uptime only
//! ```
//!
//! # Design Decisions
//! - Probes run concurrently, each under its own deadline
//! - Reports are recomputed on every call
//! - Liveness never touches a dependency

pub mod aggregator;
pub mod handlers;
pub mod status;

use axum::{routing::get, Router};

use crate::http::server::AppState;
use self::handlers::*;

pub use aggregator::HealthAggregator;
pub use status::{HealthReport, LivenessReport, OverallStatus, ProbeReport, ProbeStatus, ReadinessReport};

pub fn setup_health_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/ready", get(get_ready))
        .route("/live", get(get_live))
        .with_state(state)
}
