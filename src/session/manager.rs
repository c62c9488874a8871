//! Session lifecycle against the shared store.
//!
//! # Keys
//! ```text
//! session:{session_id}      → JSON SessionRecord, TTL = session ttl
//! user_sessions:{user_id}   → set of session ids, TTL refreshed on every add
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::auth::claims::IdentityClaims;
use crate::config::SessionConfig;
use crate::observability::metrics;
use crate::session::record::SessionRecord;
use crate::store::{Store, StoreError};

const SESSION_PREFIX: &str = "session:";
const USER_INDEX_PREFIX: &str = "user_sessions:";
const TOKEN_SESSION_PREFIX: &str = "tok_";

/// Session id entropy in bytes (256 bits).
const SESSION_ID_BYTES: usize = 32;

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("session record could not be encoded: {0}")]
    Encode(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Outcome of a session lookup. A miss is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLookup {
    Active(SessionRecord),
    NotFound,
}

impl SessionLookup {
    pub fn into_active(self) -> Option<SessionRecord> {
        match self {
            SessionLookup::Active(record) => Some(record),
            SessionLookup::NotFound => None,
        }
    }
}

/// Inputs for a new session.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub user_id: String,
    pub email: String,
    pub role: Option<String>,
    pub tenant_id: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
}

impl NewSession {
    pub fn for_identity(identity: &IdentityClaims, ip_address: String, user_agent: String) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            email: identity.email.clone(),
            role: identity.role.clone(),
            tenant_id: identity.tenant_id.clone(),
            ip_address,
            user_agent,
        }
    }
}

pub struct SessionManager {
    store: Arc<dyn Store>,
    ttl: Duration,
    max_per_user: usize,
}

impl SessionManager {
    pub fn new(store: Arc<dyn Store>, config: &SessionConfig) -> Self {
        Self {
            store,
            ttl: Duration::from_secs(config.ttl_secs),
            max_per_user: config.max_sessions_per_user,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// A fresh random session id, URL-safe hex.
    pub fn generate_session_id() -> String {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Deterministic session id for a verified token.
    pub fn token_session_id(user_id: &str, issued_at: i64) -> String {
        let digest = Sha256::digest(format!("{}:{}", user_id, issued_at).as_bytes());
        format!("{}{}", TOKEN_SESSION_PREFIX, hex::encode(digest))
    }

    fn session_key(session_id: &str) -> String {
        format!("{}{}", SESSION_PREFIX, session_id)
    }

    fn index_key(user_id: &str) -> String {
        format!("{}{}", USER_INDEX_PREFIX, user_id)
    }

    /// Create a session under a new random id.
    pub async fn create_session(&self, new: NewSession) -> SessionResult<SessionRecord> {
        self.create_session_with_id(Self::generate_session_id(), new).await
    }

    /// Create (or overwrite) a session under a caller-chosen id.
    pub async fn create_session_with_id(&self, session_id: String, new: NewSession) -> SessionResult<SessionRecord> {
        let now = Utc::now();
        let record = SessionRecord {
            session_id,
            user_id: new.user_id,
            email: new.email,
            role: new.role,
            tenant_id: new.tenant_id,
            created_at: now,
            last_access: now,
            ip_address: new.ip_address,
            user_agent: new.user_agent,
        };

        self.persist(&record).await?;
        self.store
            .set_add(&Self::index_key(&record.user_id), &record.session_id, self.ttl)
            .await?;

        metrics::record_session_event("created");
        tracing::info!(user_id = %record.user_id, "Session created");

        if self.max_per_user > 0 {
            self.enforce_limit(&record.user_id, &record.session_id).await?;
        }
        Ok(record)
    }

    /// Look up a session and refresh its last access and TTL.
    pub async fn validate_session(&self, session_id: &str) -> SessionResult<SessionLookup> {
        let key = Self::session_key(session_id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(SessionLookup::NotFound);
        };

        let mut record: SessionRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable session record");
                self.store.del(&key).await?;
                return Ok(SessionLookup::NotFound);
            }
        };

        record.last_access = Utc::now();
        self.persist(&record).await?;
        self.store.expire(&Self::index_key(&record.user_id), self.ttl).await?;
        Ok(SessionLookup::Active(record))
    }

    /// Delete one session. The index entry is removed when the owner can be read.
    pub async fn invalidate_session(&self, session_id: &str) -> SessionResult<()> {
        let key = Self::session_key(session_id);

        let owner = match self.store.get(&key).await {
            Ok(Some(raw)) => serde_json::from_str::<SessionRecord>(&raw).ok().map(|r| r.user_id),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Session owner lookup failed; deleting record only");
                None
            }
        };

        self.store.del(&key).await?;
        if let Some(user_id) = owner {
            if let Err(e) = self.store.set_remove(&Self::index_key(&user_id), session_id).await {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to update session index");
            }
        }

        metrics::record_session_event("invalidated");
        Ok(())
    }

    /// Delete every session of a user, then the index. Returns how many were listed.
    pub async fn invalidate_all_user_sessions(&self, user_id: &str) -> SessionResult<usize> {
        let index = Self::index_key(user_id);
        let ids = self.store.set_members(&index).await?;
        for id in &ids {
            self.store.del(&Self::session_key(id)).await?;
        }
        self.store.del(&index).await?;

        metrics::record_session_event("bulk_invalidated");
        tracing::info!(user_id = %user_id, count = ids.len(), "All user sessions invalidated");
        Ok(ids.len())
    }

    pub async fn active_session_count(&self, user_id: &str) -> SessionResult<usize> {
        Ok(self.store.set_len(&Self::index_key(user_id)).await?)
    }

    async fn persist(&self, record: &SessionRecord) -> SessionResult<()> {
        let json = serde_json::to_string(record).map_err(|e| SessionError::Encode(e.to_string()))?;
        self.store
            .set_ex(&Self::session_key(&record.session_id), &json, self.ttl)
            .await?;
        Ok(())
    }

    /// Evict the oldest sessions beyond the per-user limit, never `keep`.
    async fn enforce_limit(&self, user_id: &str, keep: &str) -> SessionResult<()> {
        let index = Self::index_key(user_id);
        let ids = self.store.set_members(&index).await?;
        if ids.len() <= self.max_per_user {
            return Ok(());
        }

        let mut live = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.get(&Self::session_key(&id)).await? {
                Some(raw) => match serde_json::from_str::<SessionRecord>(&raw) {
                    Ok(record) => live.push(record),
                    Err(_) => self.store.set_remove(&index, &id).await?,
                },
                // Expired records linger in the index until now.
                None => self.store.set_remove(&index, &id).await?,
            }
        }

        if live.len() <= self.max_per_user {
            return Ok(());
        }
        live.sort_by_key(|r| r.created_at);
        let excess = live.len() - self.max_per_user;
        for record in live.iter().filter(|r| r.session_id != keep).take(excess) {
            self.store.del(&Self::session_key(&record.session_id)).await?;
            self.store.set_remove(&index, &record.session_id).await?;
            metrics::record_session_event("evicted");
            tracing::info!(user_id = %user_id, "Evicted oldest session over limit");
        }
        Ok(())
    }
}
