//! Identity claims carried by bearer tokens.
//!
//! [`TokenClaims`] is the wire form (every field optional so that decoding
//! never fails on shape alone); [`IdentityClaims`] is the validated form the
//! pipeline works with. [`IdentityClaims::decode`] is the only way from one
//! to the other and it fails closed on any missing required field.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims as they appear inside a token payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(alias = "user_id", skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Coarse permissions embedded by the issuer (legacy/offline mode).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
}

/// Why a payload could not be turned into [`IdentityClaims`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimsError {
    #[error("claim '{0}' is missing")]
    Missing(&'static str),

    #[error("claim '{0}' is empty")]
    Empty(&'static str),

    #[error("claims payload is malformed: {0}")]
    Malformed(String),
}

/// Verified caller identity, immutable for the rest of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityClaims {
    pub user_id: String,
    pub email: String,
    /// Single coarse role tag; `None` when the issuer set none.
    pub role: Option<String>,
    pub tenant_id: Option<String>,
    pub issued_at: i64,
    pub expires_at: i64,
    pub token_id: Option<String>,
    pub permissions: Vec<String>,
}

impl IdentityClaims {
    /// Decode a verified payload. `sub`, `email`, `iat` and `exp` are required.
    pub fn decode(payload: serde_json::Value) -> Result<Self, ClaimsError> {
        let raw: TokenClaims =
            serde_json::from_value(payload).map_err(|e| ClaimsError::Malformed(e.to_string()))?;

        let user_id = required(raw.sub, "sub")?;
        let email = required(raw.email, "email")?;
        let issued_at = raw.iat.ok_or(ClaimsError::Missing("iat"))?;
        let expires_at = raw.exp.ok_or(ClaimsError::Missing("exp"))?;

        Ok(Self {
            user_id,
            email,
            role: raw.role.filter(|r| !r.is_empty()),
            tenant_id: raw.tenant_id.filter(|t| !t.is_empty()),
            issued_at,
            expires_at,
            token_id: raw.jti.filter(|j| !j.is_empty()),
            permissions: raw.permissions,
        })
    }

    /// The wire form of these claims, for re-signing.
    pub fn to_token_claims(&self) -> TokenClaims {
        TokenClaims {
            sub: Some(self.user_id.clone()),
            email: Some(self.email.clone()),
            role: self.role.clone(),
            tenant_id: self.tenant_id.clone(),
            iat: Some(self.issued_at),
            exp: Some(self.expires_at),
            jti: self.token_id.clone(),
            permissions: self.permissions.clone(),
        }
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ClaimsError> {
    match value {
        None => Err(ClaimsError::Missing(name)),
        Some(v) if v.trim().is_empty() => Err(ClaimsError::Empty(name)),
        Some(v) => Ok(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_full_payload() {
        let claims = IdentityClaims::decode(json!({
            "sub": "u-1",
            "email": "a@example.com",
            "role": "admin",
            "tenant_id": "t-9",
            "iat": 100,
            "exp": 200,
            "jti": "tok-1",
            "permissions": ["report.read"]
        }))
        .unwrap();

        assert_eq!(claims.user_id, "u-1");
        assert_eq!(claims.role.as_deref(), Some("admin"));
        assert_eq!(claims.tenant_id.as_deref(), Some("t-9"));
        assert_eq!(claims.permissions, vec!["report.read".to_string()]);
    }

    #[test]
    fn test_user_id_alias() {
        let claims = IdentityClaims::decode(json!({
            "user_id": "u-2", "email": "b@example.com", "iat": 1, "exp": 2
        }))
        .unwrap();
        assert_eq!(claims.user_id, "u-2");
        assert_eq!(claims.role, None);
    }

    #[test]
    fn test_missing_and_malformed_claims() {
        assert_eq!(
            IdentityClaims::decode(json!({"email": "x@y", "iat": 1, "exp": 2})),
            Err(ClaimsError::Missing("sub"))
        );
        assert_eq!(
            IdentityClaims::decode(json!({"sub": " ", "email": "x@y", "iat": 1, "exp": 2})),
            Err(ClaimsError::Empty("sub"))
        );
        assert!(matches!(
            IdentityClaims::decode(json!({"sub": 5, "email": "x@y", "iat": 1, "exp": 2})),
            Err(ClaimsError::Malformed(_))
        ));
    }

    #[test]
    fn test_empty_role_is_no_role() {
        let claims = IdentityClaims::decode(json!({
            "sub": "u", "email": "e@x", "role": "", "iat": 1, "exp": 2
        }))
        .unwrap();
        assert_eq!(claims.role, None);
    }
}
