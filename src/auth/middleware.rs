//! Authentication middleware and the role gate.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

use crate::auth::claims::IdentityClaims;
use crate::auth::token::{AuthError, TokenValidator};
use crate::error::{reject, GatewayError};
use crate::http::context::{context_mut, RequestContext};
use crate::http::server::AppState;
use crate::resilience::{call_with_policy, Guarded};

/// Validate the bearer token and annotate the request with the caller's identity.
pub async fn authenticate(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();

    if state.config.auth.is_public(&path) {
        return next.run(req).await;
    }

    let header = match req.headers().get(AUTHORIZATION) {
        None => None,
        Some(value) => match value.to_str() {
            Ok(v) => Some(v),
            Err(_) => return reject(GatewayError::InvalidAuthFormat, &path),
        },
    };

    let claims = match state.validator.validate_header(header) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(path = %path, error = %e, "Authentication failed");
            return reject(e.into(), &path);
        }
    };
    let token = match TokenValidator::extract_bearer(header) {
        Ok(token) => token.to_string(),
        Err(e) => return reject(GatewayError::from(e), &path),
    };

    let revoked = call_with_policy(
        "token_blacklist",
        state.config.auth.blacklist_failure_policy,
        Duration::from_millis(state.config.store.op_timeout_ms),
        state.blacklist.is_revoked(&claims, &token),
    )
    .await;
    match revoked {
        Guarded::Completed(false) | Guarded::Degraded { admit: true, .. } => {}
        Guarded::Completed(true) => {
            tracing::debug!(user_id = %claims.user_id, "Revoked token presented");
            return reject(GatewayError::TokenRevoked, &path);
        }
        Guarded::Degraded { admit: false, .. } => {
            return reject(AuthError::InvalidToken("revocation status unknown".into()).into(), &path);
        }
    }

    mirror_identity(req.headers_mut(), &claims);
    context_mut(&mut req).set_identity(claims, token);

    next.run(req).await
}

/// Copy identity into forward-only headers for services that do not parse tokens.
pub fn mirror_identity(headers: &mut HeaderMap, claims: &IdentityClaims) {
    let pairs = [
        ("x-user-id", Some(claims.user_id.as_str())),
        ("x-user-email", Some(claims.email.as_str())),
        ("x-user-role", claims.role.as_deref()),
        ("x-tenant-id", claims.tenant_id.as_deref()),
    ];
    for (name, value) in pairs {
        let Some(value) = value else { continue };
        match HeaderValue::from_str(value) {
            Ok(v) => {
                headers.insert(name, v);
            }
            Err(_) => tracing::warn!(header = name, "Claim value is not a valid header value; not forwarded"),
        }
    }
}

/// Exact-match role gate.
pub fn require_role(identity: Option<&IdentityClaims>, required: &str) -> Result<(), GatewayError> {
    let role = identity
        .and_then(|c| c.role.as_deref())
        .ok_or(GatewayError::NoRole)?;
    if role == required {
        Ok(())
    } else {
        Err(GatewayError::InsufficientPermissions {
            required: required.to_string(),
        })
    }
}

/// Role required by a route group.
#[derive(Debug, Clone)]
pub struct RequiredRole(pub Arc<str>);

impl RequiredRole {
    pub fn new(role: &str) -> Self {
        Self(Arc::from(role))
    }
}

/// `RequireRole(role)` as a route layer.
pub async fn require_role_middleware(
    State(required): State<RequiredRole>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ctx = req.extensions().get::<RequestContext>();
    if let Err(e) = require_role(ctx.and_then(|c| c.identity()), &required.0) {
        tracing::warn!(path = %req.uri().path(), required = %required.0, code = e.code(), "Role gate denied request");
        return reject(e, req.uri().path());
    }
    next.run(req).await
}
