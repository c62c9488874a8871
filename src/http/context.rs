//! Request-scoped context carried through the middleware chain.
//!
//! Each stage reads and writes its own annotation through typed accessors;
//! nothing is looked up by string key. The context lives in the request
//! extensions and is dropped with the request.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::auth::claims::IdentityClaims;
use crate::observability::metrics;
use crate::security::rate_limit::RateLimitDecision;
use crate::session::record::{SessionRecord, SessionSource};

/// Headers only the gateway may set on forwarded requests.
pub const FORWARD_ONLY_HEADERS: [&str; 5] = [
    "x-user-id",
    "x-user-email",
    "x-user-role",
    "x-tenant-id",
    "x-session-user-id",
];

/// A session resolved for this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub record: SessionRecord,
    pub source: SessionSource,
}

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    client_ip: Option<IpAddr>,
    identity: Option<IdentityClaims>,
    raw_token: Option<String>,
    rate_limit: Option<RateLimitDecision>,
    session: Option<ActiveSession>,
}

impl RequestContext {
    pub fn new(client_ip: Option<IpAddr>) -> Self {
        Self {
            client_ip,
            ..Self::default()
        }
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }

    /// Client address as used in rate-limit keys and session records.
    pub fn client_address(&self) -> String {
        self.client_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn identity(&self) -> Option<&IdentityClaims> {
        self.identity.as_ref()
    }

    pub fn raw_token(&self) -> Option<&str> {
        self.raw_token.as_deref()
    }

    pub fn set_identity(&mut self, identity: IdentityClaims, raw_token: String) {
        self.identity = Some(identity);
        self.raw_token = Some(raw_token);
    }

    pub fn rate_limit(&self) -> Option<&RateLimitDecision> {
        self.rate_limit.as_ref()
    }

    pub fn set_rate_limit(&mut self, decision: RateLimitDecision) {
        self.rate_limit = Some(decision);
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: ActiveSession) {
        self.session = Some(session);
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<RequestContext>().cloned().unwrap_or_default())
    }
}

/// The context of a request, created on first use.
pub fn context_mut<B>(req: &mut Request<B>) -> &mut RequestContext {
    req.extensions_mut().get_or_insert_default::<RequestContext>()
}

/// Remove headers a client could use to impersonate gateway annotations.
pub fn strip_forward_only_headers(headers: &mut HeaderMap) {
    for name in FORWARD_ONLY_HEADERS {
        headers.remove(name);
    }
}

/// First stage: seed the context and record request metrics.
pub async fn init_context(mut req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();

    let client_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    strip_forward_only_headers(req.headers_mut());
    req.extensions_mut().insert(RequestContext::new(client_ip));

    let response = next.run(req).await;
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}
