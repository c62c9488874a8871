//! Gateway-owned session endpoints.

use axum::{
    extract::{Path, State},
    http::{header::SET_COOKIE, header::USER_AGENT, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::claims::IdentityClaims;
use crate::error::{reject, GatewayError};
use crate::http::context::RequestContext;
use crate::http::server::AppState;
use crate::session::manager::{NewSession, SessionError};
use crate::session::record::SessionRecord;

type HandlerResult = Result<Response, Response>;

#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub session_id: String,
    pub user_id: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct CurrentSession {
    #[serde(flatten)]
    pub record: SessionRecord,
    pub source: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SessionCount {
    pub user_id: String,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct Invalidated {
    pub user_id: String,
    pub invalidated: usize,
}

fn caller<'a>(ctx: &'a RequestContext, uri: &Uri) -> Result<&'a IdentityClaims, Response> {
    ctx.identity()
        .ok_or_else(|| reject(GatewayError::MissingAuthHeader, uri.path()))
}

fn internal(err: SessionError, uri: &Uri) -> Response {
    tracing::error!(path = %uri.path(), error = %err, "Session operation failed");
    reject(GatewayError::Internal, uri.path())
}

fn session_cookie(state: &AppState, value: &str, max_age: u64) -> Option<HeaderValue> {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        state.config.session.cookie_name, value, max_age
    );
    HeaderValue::from_str(&cookie).ok()
}

/// Revoke the presented token so logout also ends the bearer credential.
async fn revoke_token(state: &AppState, ctx: &RequestContext) {
    if let (Some(identity), Some(raw)) = (ctx.identity(), ctx.raw_token()) {
        if let Err(e) = state.blacklist.revoke(identity, raw).await {
            tracing::warn!(user_id = %identity.user_id, error = %e, "Failed to revoke token on logout");
        }
    }
}

/// POST /api/v1/sessions
pub async fn create_session(
    State(state): State<AppState>,
    ctx: RequestContext,
    uri: Uri,
    headers: HeaderMap,
) -> HandlerResult {
    let identity = caller(&ctx, &uri)?;
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let record = state
        .sessions
        .create_session(NewSession::for_identity(identity, ctx.client_address(), user_agent))
        .await
        .map_err(|e| internal(e, &uri))?;

    let ttl = state.sessions.ttl().as_secs();
    let mut response = (
        StatusCode::CREATED,
        Json(CreatedSession {
            session_id: record.session_id.clone(),
            user_id: record.user_id,
            expires_in: ttl,
        }),
    )
        .into_response();
    if let Some(cookie) = session_cookie(&state, &record.session_id, ttl) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    Ok(response)
}

/// GET /api/v1/sessions/current
pub async fn current_session(ctx: RequestContext, uri: Uri) -> HandlerResult {
    let active = ctx
        .session()
        .ok_or_else(|| reject(GatewayError::SessionRequired, uri.path()))?;
    Ok(Json(CurrentSession {
        record: active.record.clone(),
        source: active.source.as_str(),
    })
    .into_response())
}

/// DELETE /api/v1/sessions/current
pub async fn logout(State(state): State<AppState>, ctx: RequestContext, uri: Uri) -> HandlerResult {
    caller(&ctx, &uri)?;
    if let Some(active) = ctx.session() {
        state
            .sessions
            .invalidate_session(&active.record.session_id)
            .await
            .map_err(|e| internal(e, &uri))?;
    }
    revoke_token(&state, &ctx).await;

    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Some(cookie) = session_cookie(&state, "", 0) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    Ok(response)
}

/// DELETE /api/v1/sessions
pub async fn logout_everywhere(State(state): State<AppState>, ctx: RequestContext, uri: Uri) -> HandlerResult {
    let identity = caller(&ctx, &uri)?;
    let invalidated = state
        .sessions
        .invalidate_all_user_sessions(&identity.user_id)
        .await
        .map_err(|e| internal(e, &uri))?;
    revoke_token(&state, &ctx).await;

    Ok(Json(Invalidated {
        user_id: identity.user_id.clone(),
        invalidated,
    })
    .into_response())
}

/// GET /api/v1/sessions/count
pub async fn session_count(State(state): State<AppState>, ctx: RequestContext, uri: Uri) -> HandlerResult {
    let identity = caller(&ctx, &uri)?;
    let active_sessions = state
        .sessions
        .active_session_count(&identity.user_id)
        .await
        .map_err(|e| internal(e, &uri))?;
    Ok(Json(SessionCount {
        user_id: identity.user_id.clone(),
        active_sessions,
    })
    .into_response())
}

/// DELETE /api/v1/admin/users/{user_id}/sessions
pub async fn force_logout_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ctx: RequestContext,
    uri: Uri,
) -> HandlerResult {
    let invalidated = state
        .sessions
        .invalidate_all_user_sessions(&user_id)
        .await
        .map_err(|e| internal(e, &uri))?;
    tracing::warn!(
        target_user = %user_id,
        admin = ctx.identity().map(|c| c.user_id.as_str()).unwrap_or("-"),
        invalidated,
        "Forced logout"
    );
    Ok(Json(Invalidated { user_id, invalidated }).into_response())
}
