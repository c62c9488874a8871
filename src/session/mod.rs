//! Server-side sessions.
//!
//! # Data Flow
//! ```text
//! Authenticated request
//!     → middleware.rs (discover: token-derived id → cookie → header)
//!     → manager.rs (validate, refresh last access + TTL)
//!     → ActiveSession on RequestContext + X-Session-* headers
//!
//! Session endpoints (handlers.rs):
//!     create / current / logout / logout everywhere / count / forced logout
//! ```

pub mod handlers;
pub mod manager;
pub mod middleware;
pub mod record;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};

use crate::auth::middleware::{require_role_middleware, RequiredRole};
use crate::http::server::AppState;
use self::handlers::*;

pub use manager::{NewSession, SessionError, SessionLookup, SessionManager};
pub use self::middleware::{attach_session, require_session_middleware};
pub use record::{SessionRecord, SessionSource};

/// Role allowed to end other users' sessions.
pub const ADMIN_ROLE: &str = "admin";

pub fn setup_session_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/v1/admin/users/{user_id}/sessions", delete(force_logout_user))
        .route_layer(from_fn_with_state(RequiredRole::new(ADMIN_ROLE), require_role_middleware));

    Router::new()
        .route("/api/v1/sessions", post(create_session).delete(logout_everywhere))
        .route("/api/v1/sessions/current", get(current_session).delete(logout))
        .route("/api/v1/sessions/count", get(session_count))
        .merge(admin)
        .with_state(state)
}
