//! Request correlation.
//!
//! The request id is assigned by `SetRequestIdLayer` before anything else
//! runs and echoed on the response by `PropagateRequestIdLayer`; the helpers
//! here read it back for spans and logs.

use axum::{
    body::Body,
    http::{HeaderMap, Request},
};
use tracing::Span;

pub const X_REQUEST_ID: &str = "x-request-id";

/// The request id assigned to this request, if any.
pub fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
}

/// Root span for a request, tagged with its id.
pub fn make_request_span(req: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
        request_id = request_id(req.headers()).unwrap_or("unknown"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers), None);
        headers.insert(X_REQUEST_ID, "abc".parse().unwrap());
        assert_eq!(request_id(&headers), Some("abc"));
    }
}
