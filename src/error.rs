//! Rejection taxonomy and the JSON error envelope.
//!
//! Every request the pipeline turns away is rendered through [`reject`], so
//! clients can branch on a stable machine-readable `error` code.

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;

/// A terminal rejection produced by one of the middleware stages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Authorization header is required")]
    MissingAuthHeader,

    #[error("Authorization header must be 'Bearer <token>'")]
    InvalidAuthFormat,

    #[error("Token is invalid")]
    InvalidToken,

    #[error("Token claims are missing or malformed: {0}")]
    InvalidClaims(String),

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("A valid session is required")]
    SessionRequired,

    #[error("No role present on the caller")]
    NoRole,

    #[error("Role '{required}' is required")]
    InsufficientPermissions { required: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid permission format: {0}")]
    InvalidPermissionFormat(String),

    #[error("Rate limit exceeded, retry in {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("No upstream is configured for this route")]
    NoUpstream,

    #[error("Internal error")]
    Internal,
}

impl GatewayError {
    /// Machine-readable code placed in the envelope.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::MissingAuthHeader => "MISSING_AUTH_HEADER",
            GatewayError::InvalidAuthFormat => "INVALID_AUTH_FORMAT",
            GatewayError::InvalidToken => "INVALID_TOKEN",
            GatewayError::InvalidClaims(_) => "INVALID_CLAIMS",
            GatewayError::TokenExpired => "TOKEN_EXPIRED",
            GatewayError::TokenRevoked => "TOKEN_REVOKED",
            GatewayError::SessionRequired => "SESSION_REQUIRED",
            GatewayError::NoRole => "NO_ROLE",
            GatewayError::InsufficientPermissions { .. } => "INSUFFICIENT_PERMISSIONS",
            GatewayError::PermissionDenied(_) => "PERMISSION_DENIED",
            GatewayError::InvalidPermissionFormat(_) => "INVALID_PERMISSION_FORMAT",
            GatewayError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            GatewayError::NoUpstream => "NO_UPSTREAM",
            GatewayError::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingAuthHeader
            | GatewayError::InvalidAuthFormat
            | GatewayError::InvalidToken
            | GatewayError::InvalidClaims(_)
            | GatewayError::TokenExpired
            | GatewayError::TokenRevoked
            | GatewayError::SessionRequired => StatusCode::UNAUTHORIZED,
            GatewayError::NoRole
            | GatewayError::InsufficientPermissions { .. }
            | GatewayError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            GatewayError::InvalidPermissionFormat(_) => StatusCode::BAD_REQUEST,
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::NoUpstream => StatusCode::BAD_GATEWAY,
            GatewayError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The JSON body of every rejection.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: &'static str,
    pub message: String,
    pub timestamp: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorEnvelope {
    pub fn new(err: &GatewayError, path: &str) -> Self {
        let retry_after = match err {
            GatewayError::RateLimitExceeded { retry_after } => Some(*retry_after),
            _ => None,
        };
        Self {
            error: err.code(),
            message: err.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            path: path.to_string(),
            retry_after,
        }
    }
}

/// Render a rejection for the given request path.
pub fn reject(err: GatewayError, path: &str) -> Response {
    crate::observability::metrics::record_rejection(err.code());
    let envelope = ErrorEnvelope::new(&err, path);
    let mut response = (err.status(), Json(envelope)).into_response();
    if let GatewayError::RateLimitExceeded { retry_after } = err {
        response
            .headers_mut()
            .insert("Retry-After", HeaderValue::from(retry_after));
    }
    response
}
