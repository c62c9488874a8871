//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (after authentication):
//!     → rate_limit.rs (classify endpoint, sliding-window check in the store)
//!     → X-RateLimit-* headers on every classified response
//! ```
//!
//! # Design Decisions
//! - Limits are shared across gateway instances through the store
//! - Fail open: a store outage never blocks traffic
//! - Rejected attempts do not consume window capacity

pub mod rate_limit;

pub use rate_limit::{rate_limit, EndpointClass, RateLimitDecision, SlidingWindowLimiter};
