//! Revoked-token list kept in the shared store.
//!
//! A token is identified by its `jti` when present, otherwise by the SHA-256
//! of the raw token. Entries live until the token would have expired anyway.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::auth::claims::IdentityClaims;
use crate::store::{Store, StoreResult};

const KEY_PREFIX: &str = "blacklist:";

pub struct TokenBlacklist {
    store: Arc<dyn Store>,
}

impl TokenBlacklist {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Store key for a token.
    pub fn key_for(claims: &IdentityClaims, raw_token: &str) -> String {
        match &claims.token_id {
            Some(jti) => format!("{}jti:{}", KEY_PREFIX, jti),
            None => format!("{}sha256:{}", KEY_PREFIX, hex::encode(Sha256::digest(raw_token.as_bytes()))),
        }
    }

    /// Revoke a token for the rest of its lifetime.
    pub async fn revoke(&self, claims: &IdentityClaims, raw_token: &str) -> StoreResult<()> {
        let remaining = (claims.expires_at - Utc::now().timestamp()).max(1) as u64;
        self.revoke_key(&Self::key_for(claims, raw_token), Duration::from_secs(remaining))
            .await?;
        tracing::info!(user_id = %claims.user_id, "Token revoked");
        Ok(())
    }

    pub async fn is_revoked(&self, claims: &IdentityClaims, raw_token: &str) -> StoreResult<bool> {
        self.is_revoked_key(&Self::key_for(claims, raw_token)).await
    }

    pub async fn revoke_key(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        self.store.set_ex(key, "1", ttl).await
    }

    pub async fn is_revoked_key(&self, key: &str) -> StoreResult<bool> {
        self.store.exists(key).await
    }

    pub async fn forget_key(&self, key: &str) -> StoreResult<()> {
        self.store.del(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn claims(jti: Option<&str>) -> IdentityClaims {
        IdentityClaims {
            user_id: "u".into(),
            email: "e@x".into(),
            role: None,
            tenant_id: None,
            issued_at: 0,
            expires_at: Utc::now().timestamp() + 60,
            token_id: jti.map(str::to_string),
            permissions: vec![],
        }
    }

    #[tokio::test]
    async fn test_revoke_by_jti_and_by_hash() {
        let blacklist = TokenBlacklist::new(Arc::new(MemoryStore::new()));

        let with_jti = claims(Some("abc"));
        assert!(!blacklist.is_revoked(&with_jti, "raw-1").await.unwrap());
        blacklist.revoke(&with_jti, "raw-1").await.unwrap();
        assert!(blacklist.is_revoked(&with_jti, "raw-other").await.unwrap());

        let without = claims(None);
        blacklist.revoke(&without, "raw-2").await.unwrap();
        assert!(blacklist.is_revoked(&without, "raw-2").await.unwrap());
        assert!(!blacklist.is_revoked(&without, "raw-3").await.unwrap());
    }

    #[test]
    fn test_key_shapes() {
        assert_eq!(TokenBlacklist::key_for(&claims(Some("j")), "t"), "blacklist:jti:j");
        assert!(TokenBlacklist::key_for(&claims(None), "t").starts_with("blacklist:sha256:"));
    }
}
