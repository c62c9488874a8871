//! Session discovery and the `RequireSession` gate.
//!
//! Candidates are tried in order: the id derived from the verified token,
//! the session cookie, then the session header. The first candidate that
//! resolves to a live record owned by the caller wins.

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header::COOKIE, header::USER_AGENT, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

use crate::auth::claims::IdentityClaims;
use crate::config::SessionConfig;
use crate::error::{reject, GatewayError};
use crate::http::context::{context_mut, ActiveSession, RequestContext};
use crate::http::server::AppState;
use crate::resilience::{call_with_policy, FailurePolicy, Guarded};
use crate::session::manager::{NewSession, SessionLookup, SessionManager};
use crate::session::record::SessionSource;

/// Value of a named cookie in the `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Session id candidates in precedence order.
pub fn session_candidates(
    headers: &HeaderMap,
    config: &SessionConfig,
    identity: Option<&IdentityClaims>,
) -> Vec<(String, SessionSource)> {
    let mut candidates = Vec::with_capacity(3);
    if let Some(identity) = identity {
        candidates.push((
            SessionManager::token_session_id(&identity.user_id, identity.issued_at),
            SessionSource::TokenDerived,
        ));
    }
    if let Some(id) = cookie_value(headers, &config.cookie_name) {
        candidates.push((id, SessionSource::Cookie));
    }
    if let Some(id) = headers
        .get(config.header_name.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        candidates.push((id.to_string(), SessionSource::Header));
    }
    candidates
}

/// Resolve the request's session, if any, and enforce route-level `require_session`.
pub async fn attach_session(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let op_timeout = Duration::from_millis(state.config.store.op_timeout_ms);

    let (identity, client) = match req.extensions().get::<RequestContext>() {
        Some(ctx) => (ctx.identity().cloned(), ctx.client_address()),
        None => (None, "unknown".to_string()),
    };
    let candidates = session_candidates(req.headers(), &state.config.session, identity.as_ref());

    let mut found = None;
    for (id, source) in candidates {
        let lookup = call_with_policy(
            "session_store",
            FailurePolicy::FailOpen,
            op_timeout,
            state.sessions.validate_session(&id),
        )
        .await;
        match lookup {
            Guarded::Completed(SessionLookup::Active(record)) => {
                if let Some(identity) = &identity {
                    if record.user_id != identity.user_id {
                        tracing::debug!(source = source.as_str(), "Ignoring session owned by another user");
                        continue;
                    }
                }
                found = Some(ActiveSession { record, source });
                break;
            }
            Guarded::Completed(SessionLookup::NotFound) => continue,
            // Store is down: continue without a session.
            Guarded::Degraded { .. } => break,
        }
    }

    if found.is_none() && state.config.session.track_token_sessions {
        if let Some(identity) = &identity {
            let user_agent = req
                .headers()
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let id = SessionManager::token_session_id(&identity.user_id, identity.issued_at);
            let created = call_with_policy(
                "session_store",
                FailurePolicy::FailOpen,
                op_timeout,
                state
                    .sessions
                    .create_session_with_id(id, NewSession::for_identity(identity, client, user_agent)),
            )
            .await;
            if let Guarded::Completed(record) = created {
                found = Some(ActiveSession {
                    record,
                    source: SessionSource::TokenDerived,
                });
            }
        }
    }

    if found.is_none() {
        // A client-supplied id that did not resolve is not forwarded.
        let headers = req.headers_mut();
        headers.remove("x-session-id");
        headers.remove(state.config.session.header_name.as_str());
    }

    let method = req.method().as_str().to_string();
    let required = state
        .config
        .rule_for(&method, &path)
        .map(|rule| rule.require_session)
        .unwrap_or(false);

    match found {
        Some(active) => {
            let headers = req.headers_mut();
            if let Ok(v) = HeaderValue::from_str(&active.record.session_id) {
                headers.insert("x-session-id", v);
            }
            if let Ok(v) = HeaderValue::from_str(&active.record.user_id) {
                headers.insert("x-session-user-id", v);
            }
            context_mut(&mut req).set_session(active);
        }
        None if required => {
            tracing::debug!(path = %path, "Route requires a session");
            return reject(GatewayError::SessionRequired, &path);
        }
        None => {}
    }

    next.run(req).await
}

/// `RequireSession` as a route layer.
pub async fn require_session_middleware(req: Request<Body>, next: Next) -> Response {
    let has_session = req
        .extensions()
        .get::<RequestContext>()
        .and_then(|ctx| ctx.session())
        .is_some();
    if !has_session {
        return reject(GatewayError::SessionRequired, req.uri().path());
    }
    next.run(req).await
}
