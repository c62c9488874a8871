//! Bearer token validation.
//!
//! # Validation order
//! ```text
//! Authorization header
//!     → extract_bearer (MISSING_AUTH_HEADER / INVALID_AUTH_FORMAT)
//!     → decode_header
//!     → resolve_key: algorithm pinned BEFORE any key lookup (INVALID_TOKEN)
//!     → signature + library exp check
//!     → IdentityClaims::decode (INVALID_CLAIMS)
//!     → explicit wall-clock expiry check (TOKEN_EXPIRED)
//! ```

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::auth::claims::{ClaimsError, IdentityClaims, TokenClaims};
use crate::config::AuthConfig;
use crate::error::GatewayError;

/// Authentication failures, one per rejection code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("authorization header missing")]
    MissingHeader,

    #[error("authorization header malformed")]
    InvalidFormat,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid claims: {0}")]
    InvalidClaims(#[from] ClaimsError),

    #[error("token expired")]
    Expired,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid auth configuration: {0}")]
    Config(String),
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingHeader => GatewayError::MissingAuthHeader,
            AuthError::InvalidFormat => GatewayError::InvalidAuthFormat,
            AuthError::InvalidToken(_) => GatewayError::InvalidToken,
            AuthError::InvalidClaims(e) => GatewayError::InvalidClaims(e.to_string()),
            AuthError::Expired => GatewayError::TokenExpired,
            AuthError::Signing(_) | AuthError::Config(_) => GatewayError::Internal,
        }
    }
}

/// Looks up the verification key for a token.
///
/// The validator pins the algorithm before calling this, so implementations
/// only choose among keys (e.g. by `kid`) and never decide what algorithm is
/// acceptable.
pub trait KeyResolver: Send + Sync {
    fn decoding_key(&self, header: &Header) -> Result<DecodingKey, AuthError>;
}

/// The single shared secret.
pub struct SharedSecret {
    decoding: DecodingKey,
}

impl SharedSecret {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

impl KeyResolver for SharedSecret {
    fn decoding_key(&self, _header: &Header) -> Result<DecodingKey, AuthError> {
        Ok(self.decoding.clone())
    }
}

/// Parses and verifies bearer tokens.
pub struct TokenValidator {
    algorithm: Algorithm,
    keys: Arc<dyn KeyResolver>,
    signer: Option<EncodingKey>,
}

impl TokenValidator {
    /// Build from configuration with the shared secret as both verifier and signer.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        if config.jwt_secret.is_empty() {
            return Err(AuthError::Config("shared secret is not configured".into()));
        }
        let algorithm = parse_symmetric_algorithm(&config.algorithm)?;
        let secret = config.jwt_secret.as_bytes();
        Ok(Self {
            algorithm,
            keys: Arc::new(SharedSecret::new(secret)),
            signer: Some(EncodingKey::from_secret(secret)),
        })
    }

    /// Build with a custom key lookup and no signing capability.
    pub fn with_resolver(algorithm: Algorithm, keys: Arc<dyn KeyResolver>) -> Self {
        Self {
            algorithm,
            keys,
            signer: None,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn can_sign(&self) -> bool {
        self.signer.is_some()
    }

    /// Extract the token from an `Authorization` header value.
    pub fn extract_bearer(header: Option<&str>) -> Result<&str, AuthError> {
        let value = header.ok_or(AuthError::MissingHeader)?;
        let (scheme, token) = value.split_once(' ').ok_or(AuthError::InvalidFormat)?;
        let token = token.trim();
        if scheme != "Bearer" || token.is_empty() || token.contains(' ') {
            return Err(AuthError::InvalidFormat);
        }
        Ok(token)
    }

    /// Validate a raw `Authorization` header value.
    pub fn validate_header(&self, header: Option<&str>) -> Result<IdentityClaims, AuthError> {
        let token = Self::extract_bearer(header)?;
        self.validate(token)
    }

    /// Validate a bare token.
    pub fn validate(&self, token: &str) -> Result<IdentityClaims, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let key = self.resolve_key(&header)?;

        let mut validation = Validation::new(self.algorithm);
        validation.algorithms = vec![self.algorithm];
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<serde_json::Value>(token, &key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::MissingRequiredClaim(claim) => {
                AuthError::InvalidClaims(ClaimsError::Malformed(format!("missing '{}'", claim)))
            }
            _ => AuthError::InvalidToken(e.to_string()),
        })?;

        let claims = IdentityClaims::decode(data.claims)?;

        // Same boundary as the library with zero leeway: valid through the `exp` second.
        if claims.expires_at < Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }

        Ok(claims)
    }

    /// Pin the algorithm, then look up the key.
    fn resolve_key(&self, header: &Header) -> Result<DecodingKey, AuthError> {
        if header.alg != self.algorithm {
            return Err(AuthError::InvalidToken(format!(
                "unexpected signing algorithm {:?}",
                header.alg
            )));
        }
        self.keys.decoding_key(header)
    }

    /// Sign claims with the configured algorithm.
    pub fn sign(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        let key = self
            .signer
            .as_ref()
            .ok_or_else(|| AuthError::Signing("no signing key configured".into()))?;
        encode(&Header::new(self.algorithm), claims, key).map_err(|e| AuthError::Signing(e.to_string()))
    }
}

/// Only HMAC algorithms are acceptable for a shared secret.
pub fn parse_symmetric_algorithm(name: &str) -> Result<Algorithm, AuthError> {
    let algorithm =
        Algorithm::from_str(name).map_err(|_| AuthError::Config(format!("unknown algorithm '{}'", name)))?;
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        other => Err(AuthError::Config(format!("{:?} is not a symmetric algorithm", other))),
    }
}

/// Claims for a freshly issued token valid for `ttl_secs`.
pub fn fresh_claims(user_id: &str, email: &str, role: Option<&str>, tenant_id: Option<&str>, ttl_secs: i64) -> TokenClaims {
    let now = Utc::now().timestamp();
    TokenClaims {
        sub: Some(user_id.to_string()),
        email: Some(email.to_string()),
        role: role.map(str::to_string),
        tenant_id: tenant_id.map(str::to_string),
        iat: Some(now),
        exp: Some(now + ttl_secs),
        jti: Some(uuid::Uuid::new_v4().to_string()),
        permissions: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn validator() -> TokenValidator {
        let config = AuthConfig {
            jwt_secret: SECRET.into(),
            ..AuthConfig::default()
        };
        TokenValidator::from_config(&config).unwrap()
    }

    fn sign_with(alg: Algorithm, claims: &TokenClaims) -> String {
        encode(&Header::new(alg), claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let v = validator();
        let token = v.sign(&fresh_claims("u-1", "a@x.io", Some("user"), Some("t-1"), 60)).unwrap();
        let claims = v.validate_header(Some(&format!("Bearer {}", token))).unwrap();
        assert_eq!(claims.user_id, "u-1");
        assert_eq!(claims.tenant_id.as_deref(), Some("t-1"));
    }

    #[test]
    fn test_header_shapes() {
        assert_eq!(TokenValidator::extract_bearer(None), Err(AuthError::MissingHeader));
        assert_eq!(TokenValidator::extract_bearer(Some("Basic abc")), Err(AuthError::InvalidFormat));
        assert_eq!(TokenValidator::extract_bearer(Some("Bearer")), Err(AuthError::InvalidFormat));
        assert_eq!(TokenValidator::extract_bearer(Some("Bearer ")), Err(AuthError::InvalidFormat));
        assert_eq!(TokenValidator::extract_bearer(Some("bearer abc")), Err(AuthError::InvalidFormat));
        assert_eq!(TokenValidator::extract_bearer(Some("Bearer abc")), Ok("abc"));
    }

    #[test]
    fn test_other_algorithms_rejected_even_with_valid_signature() {
        let v = validator();
        let claims = fresh_claims("u-1", "a@x.io", None, None, 60);
        for alg in [Algorithm::HS384, Algorithm::HS512] {
            let token = sign_with(alg, &claims);
            assert!(matches!(v.validate(&token), Err(AuthError::InvalidToken(_))));
        }
    }

    #[test]
    fn test_none_algorithm_rejected() {
        // {"alg":"none","typ":"JWT"} . {"sub":"u","email":"e","iat":1,"exp":9999999999} .
        let token = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.\
                     eyJzdWIiOiJ1IiwiZW1haWwiOiJlIiwiaWF0IjoxLCJleHAiOjk5OTk5OTk5OTl9.";
        assert!(matches!(validator().validate(token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_expiry_boundaries() {
        let v = validator();
        let now = Utc::now().timestamp();

        let mut claims = fresh_claims("u", "e@x", None, None, 0);
        claims.exp = Some(now - 10);
        assert_eq!(v.validate(&v.sign(&claims).unwrap()), Err(AuthError::Expired));

        claims.exp = Some(now - 1);
        assert_eq!(v.validate(&v.sign(&claims).unwrap()), Err(AuthError::Expired));

        // Stays valid even if the clock ticks over between signing and validating.
        claims.exp = Some(now + 1);
        assert!(v.validate(&v.sign(&claims).unwrap()).is_ok());
    }

    #[test]
    fn test_missing_claims() {
        let v = validator();
        let mut claims = fresh_claims("u", "e@x", None, None, 60);
        claims.email = None;
        assert!(matches!(
            v.validate(&v.sign(&claims).unwrap()),
            Err(AuthError::InvalidClaims(ClaimsError::Missing("email")))
        ));

        claims = fresh_claims("u", "e@x", None, None, 60);
        claims.exp = None;
        assert!(matches!(v.validate(&v.sign(&claims).unwrap()), Err(AuthError::InvalidClaims(_))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let claims = fresh_claims("u", "e@x", None, None, 60);
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"another-secret-another-secret-xx"),
        )
        .unwrap();
        assert!(matches!(validator().validate(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_custom_resolver_cannot_sign() {
        let v = TokenValidator::with_resolver(Algorithm::HS256, Arc::new(SharedSecret::new(SECRET.as_bytes())));
        assert!(!v.can_sign());
        let token = sign_with(Algorithm::HS256, &fresh_claims("u", "e@x", None, None, 60));
        assert!(v.validate(&token).is_ok());
    }

    #[test]
    fn test_only_symmetric_algorithms() {
        assert_eq!(parse_symmetric_algorithm("HS512"), Ok(Algorithm::HS512));
        assert!(parse_symmetric_algorithm("RS256").is_err());
        assert!(parse_symmetric_algorithm("none").is_err());
    }
}
