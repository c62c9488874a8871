//! Terminal responses produced by the gateway itself.

use axum::{http::Uri, response::Response, Router};

use crate::error::{reject, GatewayError};

/// Fallback when no upstream handler claims the request.
pub async fn no_upstream(uri: Uri) -> Response {
    tracing::debug!(path = %uri.path(), "No upstream for request");
    reject(GatewayError::NoUpstream, uri.path())
}

/// Upstream used when the gateway runs standalone: every approved request
/// ends in `502 NO_UPSTREAM`.
pub fn default_upstream() -> Router {
    Router::new().fallback(no_upstream)
}
