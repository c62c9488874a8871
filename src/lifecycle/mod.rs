//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Store → AppState (validator, credential, limiter, sessions, ...) → bind → serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → stop accepting, drain, stop background tasks
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, StartupError};
