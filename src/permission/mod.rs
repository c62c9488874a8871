//! Authorization beyond coarse roles.
//!
//! # Data Flow
//! ```text
//! Route rule matched (config.routes)
//!     → middleware.rs (role gate, expand {id}, parse permission)
//!     → delegate.rs (token grant? else POST to permission service)
//!     → deny on any failure
//! ```

pub mod delegate;
pub mod middleware;
pub mod parse;

pub use delegate::{DecisionSource, PermissionDecision, PermissionDelegate, PermissionError};
pub use middleware::authorize;
pub use parse::{ParsePermissionError, Permission};
