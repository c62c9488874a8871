//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → SetRequestId → Trace → PropagateRequestId → Timeout
//!     → context.rs (RequestContext, strip forward-only headers)
//!     → auth::authenticate
//!     → security::rate_limit
//!     → permission::authorize
//!     → session::attach_session
//!     → gateway routes (health, sessions) or the upstream Router
//!     → response.rs (502 when nothing claims the request)
//! ```

pub mod context;
pub mod request;
pub mod response;
pub mod server;

pub use context::{ActiveSession, RequestContext};
pub use request::X_REQUEST_ID;
pub use response::{default_upstream, no_upstream};
pub use server::{AppState, HttpServer};
