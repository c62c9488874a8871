//! Edge gateway library: authentication, rate limiting, sessions and
//! health aggregation as an axum middleware pipeline.

pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod permission;
pub mod resilience;
pub mod security;
pub mod session;
pub mod store;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
