//! Session records as persisted in the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-side state for one login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub user_agent: String,
}

/// Where a request's session id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionSource {
    /// Deterministic id derived from the verified token.
    TokenDerived,
    Cookie,
    Header,
}

impl SessionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionSource::TokenDerived => "token_derived",
            SessionSource::Cookie => "cookie",
            SessionSource::Header => "header",
        }
    }
}
