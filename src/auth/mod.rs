//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → middleware.rs (public-route bypass, header extraction)
//!     → token.rs (algorithm pinning, signature, claims, expiry)
//!     → blacklist.rs (revoked tokens)
//!     → identity attached to RequestContext + X-User-* headers
//!
//! Background:
//!     credential.rs (gateway's own service token, periodic renewal)
//! ```

pub mod blacklist;
pub mod claims;
pub mod credential;
pub mod middleware;
pub mod token;

pub use blacklist::TokenBlacklist;
pub use claims::{ClaimsError, IdentityClaims, TokenClaims};
pub use credential::ServiceCredential;
pub use middleware::{authenticate, require_role, require_role_middleware, RequiredRole};
pub use token::{fresh_claims, AuthError, KeyResolver, SharedSecret, TokenValidator};
