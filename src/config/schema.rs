//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::resilience::FailurePolicy;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Bearer token validation settings.
    pub auth: AuthConfig,

    /// Per-endpoint-class rate limits.
    pub rate_limit: RateLimitConfig,

    /// Server-side session settings.
    pub session: SessionConfig,

    /// External permission service.
    pub permission: PermissionConfig,

    /// Health aggregation settings.
    pub health: HealthConfig,

    /// Shared store connection.
    pub store: StoreConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Route rules binding path prefixes to role/permission gates.
    pub routes: Vec<RouteRule>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Token validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared HMAC secret. Required; startup fails without it.
    pub jwt_secret: String,

    /// The single accepted signing algorithm (HS256, HS384 or HS512).
    pub algorithm: String,

    /// Path prefixes that bypass token validation.
    pub public_routes: Vec<String>,

    /// What to do when the revocation list cannot be consulted.
    pub blacklist_failure_policy: FailurePolicy,

    /// Subject used for the gateway's own service credential.
    pub service_id: String,

    /// Lifetime of the gateway's service credential in seconds.
    pub service_token_ttl_secs: u64,

    /// How often the service credential is re-signed, in seconds.
    pub service_token_renew_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            algorithm: "HS256".to_string(),
            public_routes: vec![
                "/health".to_string(),
                "/ready".to_string(),
                "/live".to_string(),
                "/metrics".to_string(),
                "/api/v1/auth/login".to_string(),
                "/api/v1/auth/register".to_string(),
                "/api/v1/auth/refresh".to_string(),
            ],
            blacklist_failure_policy: FailurePolicy::FailOpen,
            service_id: "edge-gateway".to_string(),
            service_token_ttl_secs: 900,
            service_token_renew_secs: 600,
        }
    }
}

impl AuthConfig {
    /// Prefix match against the public-route allow-list.
    pub fn is_public(&self, path: &str) -> bool {
        self.public_routes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// A (limit, window) pair.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct LimitWindow {
    /// Maximum admitted requests inside the window.
    pub limit: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl LimitWindow {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    pub login_path: String,
    pub register_path: String,
    pub refresh_path: String,

    pub login: LimitWindow,
    pub register: LimitWindow,
    pub refresh: LimitWindow,

    /// Default for authenticated requests.
    pub protected: LimitWindow,

    /// Stricter pair for administrative, user-management and bulk-upload paths.
    pub sensitive: LimitWindow,

    /// Path prefixes that use the sensitive pair.
    pub sensitive_prefixes: Vec<String>,

    /// Extra seconds added to the counter TTL beyond the window.
    pub ttl_slack_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            login_path: "/api/v1/auth/login".to_string(),
            register_path: "/api/v1/auth/register".to_string(),
            refresh_path: "/api/v1/auth/refresh".to_string(),
            login: LimitWindow::new(5, 15 * 60),
            register: LimitWindow::new(3, 60 * 60),
            refresh: LimitWindow::new(10, 15 * 60),
            protected: LimitWindow::new(1000, 60 * 60),
            sensitive: LimitWindow::new(100, 60 * 60),
            sensitive_prefixes: vec![
                "/api/v1/admin".to_string(),
                "/api/v1/users".to_string(),
                "/api/v1/upload/bulk".to_string(),
            ],
            ttl_slack_secs: 60,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session lifetime in seconds, refreshed on every validated use.
    pub ttl_secs: u64,

    /// Cookie carrying the session id.
    pub cookie_name: String,

    /// Header carrying the session id.
    pub header_name: String,

    /// Maximum concurrent sessions per user (0 = unlimited).
    pub max_sessions_per_user: usize,

    /// Record a pseudo-session under the token-derived id on first sight of a token.
    pub track_token_sessions: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            cookie_name: "session_id".to_string(),
            header_name: "X-Session-ID".to_string(),
            max_sessions_per_user: 0,
            track_token_sessions: false,
        }
    }
}

/// Permission service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// Base URL of the permission service. Empty disables remote checks (deny).
    pub service_url: String,

    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:8090".to_string(),
            timeout_ms: 3000,
        }
    }
}

/// Health aggregation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Base URL of the upstream auth service. Empty skips the probe.
    pub auth_service_url: String,

    /// Timeout for network probes in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            auth_service_url: "http://localhost:8081".to_string(),
            probe_timeout_ms: 5000,
        }
    }
}

/// Shared store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// "memory" or "redis".
    pub backend: String,

    /// Connection URL for the redis backend.
    pub url: String,

    /// Per-operation timeout in milliseconds.
    pub op_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            url: "redis://127.0.0.1:6379".to_string(),
            op_timeout_ms: 500,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (whole middleware chain + upstream) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A route-level authorization rule.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteRule {
    /// Path prefix to match.
    pub path_prefix: String,

    /// Optional HTTP method (any method when absent).
    #[serde(default)]
    pub method: Option<String>,

    /// Exact role required.
    #[serde(default)]
    pub require_role: Option<String>,

    /// Permission string required, e.g. `document:{id}.read`.
    #[serde(default)]
    pub require_permission: Option<String>,

    /// Reject requests without a live session.
    #[serde(default)]
    pub require_session: bool,
}

impl RouteRule {
    /// Returns true if the rule applies to the given method and path.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        if !path.starts_with(&self.path_prefix) {
            return false;
        }
        self.method
            .as_deref()
            .map(|m| m.eq_ignore_ascii_case(method))
            .unwrap_or(true)
    }
}

impl GatewayConfig {
    /// First route rule matching the request, if any.
    pub fn rule_for(&self, method: &str, path: &str) -> Option<&RouteRule> {
        self.routes.iter().find(|r| r.matches(method, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_rate_limit_defaults() {
        let config = RateLimitConfig::default();
        assert_eq!(config.login, LimitWindow::new(5, 900));
        assert_eq!(config.register, LimitWindow::new(3, 3600));
        assert_eq!(config.refresh, LimitWindow::new(10, 900));
        assert_eq!(config.protected, LimitWindow::new(1000, 3600));
        assert_eq!(config.sensitive, LimitWindow::new(100, 3600));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [auth]
            jwt_secret = "abc"

            [rate_limit]
            login = { limit = 2, window_secs = 60 }

            [[routes]]
            path_prefix = "/api/v1/admin"
            require_role = "admin"
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.jwt_secret, "abc");
        assert_eq!(config.auth.algorithm, "HS256");
        assert_eq!(config.rate_limit.login, LimitWindow::new(2, 60));
        assert_eq!(config.rate_limit.register, LimitWindow::new(3, 3600));
        assert_eq!(config.session.ttl_secs, 86_400);
        assert_eq!(config.routes.len(), 1);
    }

    #[test]
    fn test_public_routes_are_prefixes() {
        let auth = AuthConfig::default();
        assert!(auth.is_public("/health"));
        assert!(auth.is_public("/api/v1/auth/login"));
        assert!(auth.is_public("/api/v1/auth/login/mfa"));
        assert!(!auth.is_public("/api/v1/users"));
    }

    #[test]
    fn test_route_rule_matching() {
        let rule = RouteRule {
            path_prefix: "/api/v1/reports".into(),
            method: Some("POST".into()),
            require_role: None,
            require_permission: Some("report.create".into()),
            require_session: false,
        };
        assert!(rule.matches("post", "/api/v1/reports/7"));
        assert!(!rule.matches("GET", "/api/v1/reports/7"));
        assert!(!rule.matches("POST", "/api/v1/other"));
    }
}
