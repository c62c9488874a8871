//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a dependency (store, permission service, auth service):
//!     → timeouts.rs (enforce a deadline on the call)
//!     → policy.rs (on failure, resolve to admit/deny per FailurePolicy)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No internal retries; a failed call is resolved once by its policy
//! - The policy is a value passed at the call site, never implied

pub mod policy;
pub mod timeouts;

pub use policy::{call_with_policy, FailurePolicy, Guarded};
pub use timeouts::{with_deadline, DeadlineError};
