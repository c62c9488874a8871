//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Environment variables that override file values.
pub const ENV_JWT_SECRET: &str = "GATEWAY_JWT_SECRET";
pub const ENV_STORE_URL: &str = "GATEWAY_STORE_URL";
pub const ENV_PERMISSION_SERVICE_URL: &str = "GATEWAY_PERMISSION_SERVICE_URL";
pub const ENV_AUTH_SERVICE_URL: &str = "GATEWAY_AUTH_SERVICE_URL";
pub const ENV_BIND_ADDRESS: &str = "GATEWAY_BIND_ADDRESS";

/// Load, apply environment overrides, and validate configuration.
///
/// Without a path the built-in defaults are used, so a secret must come
/// from the environment.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply overrides from a variable lookup. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(secret) = get(ENV_JWT_SECRET) {
        config.auth.jwt_secret = secret;
    }
    if let Some(url) = get(ENV_STORE_URL) {
        config.store.backend = "redis".to_string();
        config.store.url = url;
    }
    if let Some(url) = get(ENV_PERMISSION_SERVICE_URL) {
        config.permission.service_url = url;
    }
    if let Some(url) = get(ENV_AUTH_SERVICE_URL) {
        config.health.auth_service_url = url;
    }
    if let Some(addr) = get(ENV_BIND_ADDRESS) {
        config.listener.bind_address = addr;
    }
}
