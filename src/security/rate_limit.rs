//! Sliding-window rate limiting per endpoint class.
//!
//! Auth endpoints are keyed by client address and path (callers are not yet
//! identified); everything else is keyed by the authenticated user. The log
//! itself lives in the shared store so every gateway instance sees the same
//! counts. A store failure admits the request.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::config::{LimitWindow, RateLimitConfig};
use crate::error::{reject, GatewayError};
use crate::http::context::{context_mut, RequestContext};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::resilience::{call_with_policy, FailurePolicy, Guarded};
use crate::store::{Store, WindowHit};

/// Which limit pair applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    Login,
    Register,
    Refresh,
    Protected,
    Sensitive,
}

impl EndpointClass {
    pub fn as_str(self) -> &'static str {
        match self {
            EndpointClass::Login => "login",
            EndpointClass::Register => "register",
            EndpointClass::Refresh => "refresh",
            EndpointClass::Protected => "protected",
            EndpointClass::Sensitive => "sensitive",
        }
    }

    /// Auth classes are keyed by client address instead of user.
    pub fn is_auth(self) -> bool {
        matches!(self, EndpointClass::Login | EndpointClass::Register | EndpointClass::Refresh)
    }
}

/// Outcome of a rate-limit check, kept on the request context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub class: EndpointClass,
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds at which the oldest in-window entry leaves the window.
    pub reset_at: i64,
    /// Set on rejection.
    pub retry_after: Option<u64>,
    pub admitted: bool,
    /// The store could not be consulted and the request was admitted anyway.
    pub degraded: bool,
}

impl RateLimitDecision {
    /// Write the `X-RateLimit-*` headers.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert("X-RateLimit-Limit", HeaderValue::from(self.limit));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(self.remaining));
        headers.insert("X-RateLimit-Reset", HeaderValue::from(self.reset_at));
    }
}

/// Store-backed sliding-window limiter.
pub struct SlidingWindowLimiter {
    store: Arc<dyn Store>,
    config: RateLimitConfig,
    op_timeout: Duration,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn Store>, config: RateLimitConfig, op_timeout: Duration) -> Self {
        Self {
            store,
            config,
            op_timeout,
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Class for a path. `authenticated` says whether a caller identity is known.
    pub fn classify(&self, path: &str, authenticated: bool) -> Option<EndpointClass> {
        if path == self.config.login_path {
            return Some(EndpointClass::Login);
        }
        if path == self.config.register_path {
            return Some(EndpointClass::Register);
        }
        if path == self.config.refresh_path {
            return Some(EndpointClass::Refresh);
        }
        if !authenticated {
            return None;
        }
        if self
            .config
            .sensitive_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return Some(EndpointClass::Sensitive);
        }
        Some(EndpointClass::Protected)
    }

    pub fn window_for(&self, class: EndpointClass) -> LimitWindow {
        match class {
            EndpointClass::Login => self.config.login,
            EndpointClass::Register => self.config.register,
            EndpointClass::Refresh => self.config.refresh,
            EndpointClass::Protected => self.config.protected,
            EndpointClass::Sensitive => self.config.sensitive,
        }
    }

    /// Store key for a class and caller.
    pub fn key_for(class: EndpointClass, client: &str, user_id: Option<&str>, path: &str) -> String {
        match (class.is_auth(), user_id) {
            (false, Some(user)) => format!("rate_limit:{}:{}", class.as_str(), user),
            _ => format!("rate_limit:{}:{}:{}", class.as_str(), client, path),
        }
    }

    pub async fn check(&self, class: EndpointClass, key: &str) -> RateLimitDecision {
        self.check_at(class, key, Utc::now().timestamp_millis()).await
    }

    /// Record an attempt at `now_ms` and decide.
    pub async fn check_at(&self, class: EndpointClass, key: &str, now_ms: i64) -> RateLimitDecision {
        let LimitWindow { limit, window_secs } = self.window_for(class);
        let window_ms = (window_secs * 1000) as i64;
        let hit = WindowHit {
            key,
            now_ms,
            window: Duration::from_secs(window_secs),
            limit,
            member: format!("{}-{}", now_ms, uuid::Uuid::new_v4()),
            ttl: Duration::from_secs(window_secs + self.config.ttl_slack_secs),
        };

        let outcome = call_with_policy(
            "rate_limiter",
            FailurePolicy::FailOpen,
            self.op_timeout,
            self.store.window_hit(&hit),
        )
        .await;

        match outcome {
            Guarded::Completed(outcome) => {
                let reset_ms = outcome.oldest_ms.unwrap_or(now_ms) + window_ms;
                let retry_after = if outcome.admitted {
                    None
                } else {
                    Some(ceil_secs(reset_ms - now_ms).max(1) as u64)
                };
                RateLimitDecision {
                    class,
                    limit,
                    remaining: limit.saturating_sub(outcome.count),
                    reset_at: ceil_secs(reset_ms),
                    retry_after,
                    admitted: outcome.admitted,
                    degraded: false,
                }
            }
            Guarded::Degraded { .. } => RateLimitDecision {
                class,
                limit,
                remaining: limit,
                reset_at: ceil_secs(now_ms + window_ms),
                retry_after: None,
                admitted: true,
                degraded: true,
            },
        }
    }
}

fn ceil_secs(ms: i64) -> i64 {
    (ms + 999).div_euclid(1000)
}

/// Rate-limit stage of the pipeline.
pub async fn rate_limit(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    if !state.limiter.enabled() {
        return next.run(req).await;
    }
    let path = req.uri().path().to_string();

    let (client, user_id) = match req.extensions().get::<RequestContext>() {
        Some(ctx) => (ctx.client_address(), ctx.identity().map(|c| c.user_id.clone())),
        None => ("unknown".to_string(), None),
    };

    let Some(class) = state.limiter.classify(&path, user_id.is_some()) else {
        return next.run(req).await;
    };

    let key = SlidingWindowLimiter::key_for(class, &client, user_id.as_deref(), &path);
    let decision = state.limiter.check(class, &key).await;

    if let Some(retry_after) = decision.retry_after {
        tracing::warn!(
            class = class.as_str(),
            client = %client,
            user_id = user_id.as_deref().unwrap_or("-"),
            path = %path,
            retry_after,
            "Rate limit exceeded"
        );
        metrics::record_rate_limited(class.as_str());
        let mut response = reject(GatewayError::RateLimitExceeded { retry_after }, &path);
        decision.apply_headers(response.headers_mut());
        return response;
    }

    context_mut(&mut req).set_rate_limit(decision.clone());
    let mut response = next.run(req).await;
    decision.apply_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn limiter() -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(
            Arc::new(MemoryStore::new()),
            RateLimitConfig::default(),
            Duration::from_millis(500),
        )
    }

    #[test]
    fn test_classification() {
        let l = limiter();
        assert_eq!(l.classify("/api/v1/auth/login", false), Some(EndpointClass::Login));
        assert_eq!(l.classify("/api/v1/auth/register", true), Some(EndpointClass::Register));
        assert_eq!(l.classify("/api/v1/auth/refresh", false), Some(EndpointClass::Refresh));
        assert_eq!(l.classify("/api/v1/admin/stats", true), Some(EndpointClass::Sensitive));
        assert_eq!(l.classify("/api/v1/upload/bulk", true), Some(EndpointClass::Sensitive));
        assert_eq!(l.classify("/api/v1/orders", true), Some(EndpointClass::Protected));
        assert_eq!(l.classify("/api/v1/orders", false), None);
    }

    #[test]
    fn test_keys() {
        assert_eq!(
            SlidingWindowLimiter::key_for(EndpointClass::Login, "1.2.3.4", None, "/api/v1/auth/login"),
            "rate_limit:login:1.2.3.4:/api/v1/auth/login"
        );
        assert_eq!(
            SlidingWindowLimiter::key_for(EndpointClass::Protected, "1.2.3.4", Some("u-1"), "/x"),
            "rate_limit:protected:u-1"
        );
    }

    #[tokio::test]
    async fn test_login_window() {
        let l = limiter();
        let key = "rate_limit:login:1.2.3.4:/api/v1/auth/login";
        let t0 = 1_700_000_000_000;

        for i in 0..5 {
            let d = l.check_at(EndpointClass::Login, key, t0 + i * 1000).await;
            assert!(d.admitted, "attempt {} should be admitted", i + 1);
            assert_eq!(d.remaining, 4 - i as u32);
        }

        let d = l.check_at(EndpointClass::Login, key, t0 + 10_000).await;
        assert!(!d.admitted);
        assert_eq!(d.remaining, 0);
        // Oldest entry at t0 leaves the window at t0 + 900s.
        assert_eq!(d.retry_after, Some(890));
        assert_eq!(d.reset_at, (t0 + 900_000) / 1000);

        // Once the first attempt ages out, one slot frees up.
        let d = l.check_at(EndpointClass::Login, key, t0 + 900_001).await;
        assert!(d.admitted);
    }

    #[tokio::test]
    async fn test_attempts_at_window_start_still_count() {
        let l = limiter();
        let key = "rate_limit:login:5.6.7.8:/api/v1/auth/login";
        let t0 = 1_700_000_000_000;
        for _ in 0..5 {
            assert!(l.check_at(EndpointClass::Login, key, t0).await.admitted);
        }

        let d = l.check_at(EndpointClass::Login, key, t0 + 900_000).await;
        assert!(!d.admitted);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.retry_after, Some(1));

        let d = l.check_at(EndpointClass::Login, key, t0 + 900_001).await;
        assert!(d.admitted);
        assert_eq!(d.remaining, 4);
    }

    #[tokio::test]
    async fn test_retry_after_is_at_least_one() {
        let l = limiter();
        let key = "k";
        let t0 = 1_700_000_000_000;
        for _ in 0..5 {
            l.check_at(EndpointClass::Login, key, t0).await;
        }
        let d = l.check_at(EndpointClass::Login, key, t0 + 899_999).await;
        assert_eq!(d.retry_after, Some(1));
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(1000), 1);
        assert_eq!(ceil_secs(1001), 2);
        assert_eq!(ceil_secs(0), 0);
    }
}
