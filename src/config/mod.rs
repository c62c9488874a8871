//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + GATEWAY_* environment
//!     → loader.rs (parse, deserialize, apply overrides)
//!     → validation.rs (semantic checks, missing secret is fatal)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all components
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, GatewayConfig, HealthConfig, LimitWindow, ListenerConfig, ObservabilityConfig,
    PermissionConfig, RateLimitConfig, RouteRule, SessionConfig, StoreConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
