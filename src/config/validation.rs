//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Fatal-at-startup checks (shared secret present and long enough)
//! - Validate value ranges (limits and windows > 0, TTLs > 0)
//! - Validate URLs and the store backend name
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::{GatewayConfig, LimitWindow};

/// Minimum length of the shared HMAC secret in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("auth.jwt_secret is not configured")]
    MissingSecret,

    #[error("auth.jwt_secret must be at least {} bytes", MIN_SECRET_LEN)]
    WeakSecret,

    #[error("auth.algorithm '{0}' is not a supported symmetric algorithm")]
    UnsupportedAlgorithm(String),

    #[error("{0}: limit and window must both be greater than zero")]
    EmptyLimit(&'static str),

    #[error("{field}: invalid URL '{value}'")]
    InvalidUrl { field: &'static str, value: String },

    #[error("store.backend '{0}' is not one of memory, redis")]
    UnknownStoreBackend(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("routes[{0}]: rule needs a role, a permission or require_session")]
    EmptyRouteRule(usize),
}

/// Validate a loaded configuration, collecting every problem.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.auth.jwt_secret.is_empty() {
        errors.push(ValidationError::MissingSecret);
    } else if config.auth.jwt_secret.len() < MIN_SECRET_LEN {
        errors.push(ValidationError::WeakSecret);
    }

    if !matches!(config.auth.algorithm.as_str(), "HS256" | "HS384" | "HS512") {
        errors.push(ValidationError::UnsupportedAlgorithm(
            config.auth.algorithm.clone(),
        ));
    }

    let rl = &config.rate_limit;
    let pairs: [(&'static str, LimitWindow); 5] = [
        ("rate_limit.login", rl.login),
        ("rate_limit.register", rl.register),
        ("rate_limit.refresh", rl.refresh),
        ("rate_limit.protected", rl.protected),
        ("rate_limit.sensitive", rl.sensitive),
    ];
    for (field, pair) in pairs {
        if pair.limit == 0 || pair.window_secs == 0 {
            errors.push(ValidationError::EmptyLimit(field));
        }
    }

    check_url(&mut errors, "permission.service_url", &config.permission.service_url);
    check_url(&mut errors, "health.auth_service_url", &config.health.auth_service_url);

    match config.store.backend.as_str() {
        "memory" => {}
        "redis" => {
            if Url::parse(&config.store.url).is_err() {
                errors.push(ValidationError::InvalidUrl {
                    field: "store.url",
                    value: config.store.url.clone(),
                });
            }
        }
        other => errors.push(ValidationError::UnknownStoreBackend(other.to_string())),
    }

    if config.session.ttl_secs == 0 {
        errors.push(ValidationError::Zero("session.ttl_secs"));
    }
    if config.store.op_timeout_ms == 0 {
        errors.push(ValidationError::Zero("store.op_timeout_ms"));
    }
    if config.permission.timeout_ms == 0 {
        errors.push(ValidationError::Zero("permission.timeout_ms"));
    }
    if config.auth.service_token_renew_secs == 0 {
        errors.push(ValidationError::Zero("auth.service_token_renew_secs"));
    }

    for (i, rule) in config.routes.iter().enumerate() {
        if rule.require_role.is_none() && rule.require_permission.is_none() && !rule.require_session {
            errors.push(ValidationError::EmptyRouteRule(i));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Empty URLs disable the corresponding dependency and are accepted.
fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if !value.is_empty() && Url::parse(value).is_err() {
        errors.push(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
        });
    }
}
