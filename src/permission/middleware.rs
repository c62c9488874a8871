//! Route-rule authorization stage.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::auth::middleware::require_role;
use crate::error::{reject, GatewayError};
use crate::http::context::RequestContext;
use crate::http::server::AppState;
use crate::permission::parse::Permission;

/// Placeholder replaced by the path segment following the rule's prefix.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Expand `{id}` in a permission template from the request path.
pub fn resolve_permission(template: &str, prefix: &str, path: &str) -> String {
    if !template.contains(ID_PLACEHOLDER) {
        return template.to_string();
    }
    let id = path
        .strip_prefix(prefix)
        .unwrap_or_default()
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default();
    template.replace(ID_PLACEHOLDER, id)
}

/// Apply the first matching route rule: role gate, then permission check.
pub async fn authorize(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().as_str().to_string();

    let Some(rule) = state.config.rule_for(&method, &path) else {
        return next.run(req).await;
    };
    let identity = req
        .extensions()
        .get::<RequestContext>()
        .and_then(|ctx| ctx.identity());

    if let Some(role) = &rule.require_role {
        if let Err(e) = require_role(identity, role) {
            tracing::warn!(path = %path, required = %role, code = e.code(), "Role gate denied request");
            return reject(e, &path);
        }
    }

    if let Some(template) = &rule.require_permission {
        let resolved = resolve_permission(template, &rule.path_prefix, &path);
        let permission = match Permission::parse(&resolved) {
            Ok(p) => p,
            Err(e) => return reject(GatewayError::InvalidPermissionFormat(e.to_string()), &path),
        };
        let Some(identity) = identity else {
            tracing::warn!(path = %path, permission = %permission, "Permission check without identity");
            return reject(GatewayError::PermissionDenied(permission.to_string()), &path);
        };

        let decision = state.permissions.check(identity, &permission).await;
        if !decision.allowed {
            tracing::warn!(
                path = %path,
                user_id = %identity.user_id,
                permission = %permission,
                source = ?decision.source,
                reason = decision.reason.as_deref().unwrap_or("-"),
                "Permission denied"
            );
            return reject(GatewayError::PermissionDenied(permission.to_string()), &path);
        }
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_permission() {
        assert_eq!(
            resolve_permission("document:{id}.read", "/api/v1/documents", "/api/v1/documents/42/pages"),
            "document:42.read"
        );
        assert_eq!(
            resolve_permission("report.create", "/api/v1/reports", "/api/v1/reports/7"),
            "report.create"
        );
        // No segment after the prefix leaves an empty id, which fails parsing.
        let resolved = resolve_permission("document:{id}.read", "/api/v1/documents", "/api/v1/documents");
        assert_eq!(resolved, "document:.read");
        assert!(Permission::parse(&resolved).is_err());
    }
}
