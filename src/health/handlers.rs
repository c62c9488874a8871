//! Probe endpoints.

use axum::{extract::State, http::StatusCode, Json};

use crate::health::status::{HealthReport, LivenessReport, ReadinessReport};
use crate::http::server::AppState;

/// GET /health: 200 only when every probe is up.
pub async fn get_health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.health.health().await;
    let status = if report.status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

/// GET /ready
pub async fn get_ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessReport>) {
    let report = state.health.readiness().await;
    let status = if report.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

/// GET /live
pub async fn get_live(State(state): State<AppState>) -> Json<LivenessReport> {
    Json(state.health.liveness())
}
