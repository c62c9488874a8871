//! The gateway's own service credential.
//!
//! A short-lived token the gateway signs for itself and presents to the
//! permission service. A background task re-signs it on an interval; a
//! failed renewal keeps the previous token, so only future calls are
//! affected once it lapses.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::broadcast;
use tokio::time;

use crate::auth::token::{fresh_claims, AuthError, TokenValidator};
use crate::config::AuthConfig;

pub const SERVICE_ROLE: &str = "service";

pub struct ServiceCredential {
    validator: Arc<TokenValidator>,
    service_id: String,
    ttl_secs: i64,
    renew_every: Duration,
    current: ArcSwap<String>,
}

impl ServiceCredential {
    /// Sign the first credential immediately.
    pub fn issue(validator: Arc<TokenValidator>, config: &AuthConfig) -> Result<Self, AuthError> {
        let credential = Self {
            validator,
            service_id: config.service_id.clone(),
            ttl_secs: config.service_token_ttl_secs as i64,
            renew_every: Duration::from_secs(config.service_token_renew_secs),
            current: ArcSwap::from_pointee(String::new()),
        };
        credential.renew()?;
        Ok(credential)
    }

    /// Current bearer token.
    pub fn bearer(&self) -> Arc<String> {
        self.current.load_full()
    }

    /// Re-sign the credential.
    pub fn renew(&self) -> Result<(), AuthError> {
        let email = format!("{}@service.local", self.service_id);
        let claims = fresh_claims(&self.service_id, &email, Some(SERVICE_ROLE), None, self.ttl_secs);
        let token = self.validator.sign(&claims)?;
        self.current.store(Arc::new(token));
        Ok(())
    }

    /// Renew on an interval until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(self.renew_every);
        // The first tick completes immediately; the credential is already fresh.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.renew() {
                        Ok(()) => tracing::debug!(service_id = %self.service_id, "Service credential renewed"),
                        Err(e) => tracing::error!(error = %e, "Service credential renewal failed; keeping previous token"),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Credential renewal received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "0123456789abcdef0123456789abcdef".into(),
            service_token_renew_secs: 1,
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_issued_credential_validates() {
        let config = config();
        let validator = Arc::new(TokenValidator::from_config(&config).unwrap());
        let credential = ServiceCredential::issue(validator.clone(), &config).unwrap();

        let claims = validator.validate(&credential.bearer()).unwrap();
        assert_eq!(claims.user_id, "edge-gateway");
        assert_eq!(claims.role.as_deref(), Some(SERVICE_ROLE));
    }

    #[tokio::test]
    async fn test_renewal_task_swaps_token_and_stops() {
        let config = config();
        let validator = Arc::new(TokenValidator::from_config(&config).unwrap());
        let credential = Arc::new(ServiceCredential::issue(validator, &config).unwrap());
        let first = credential.bearer();

        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(credential.clone().run(rx));

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_ne!(*first, *credential.bearer());

        tx.send(()).unwrap();
        task.await.unwrap();
    }
}
