//! Client for the external permission service.
//!
//! Decisions that cannot be made from the token's own grants are escalated
//! to `POST {service_url}/api/v1/permissions/check`. Every failure denies.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::claims::IdentityClaims;
use crate::auth::credential::ServiceCredential;
use crate::config::PermissionConfig;
use crate::permission::parse::Permission;
use crate::resilience::{call_with_policy, FailurePolicy, Guarded};

pub const CHECK_PATH: &str = "/api/v1/permissions/check";

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("permission service is not configured")]
    NotConfigured,

    #[error("permission service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("permission service answered {0}")]
    Status(u16),

    #[error("permission service response is malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Serialize)]
pub struct CheckRequest<'a> {
    pub user_id: &'a str,
    pub tenant_id: Option<&'a str>,
    pub resource_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<&'a str>,
    pub action: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// How a decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    /// Token-embedded grant.
    Token,
    /// The permission service answered.
    Service,
    /// The service failed and the call was resolved by policy.
    Policy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub source: DecisionSource,
}

pub struct PermissionDelegate {
    client: reqwest::Client,
    check_url: Option<String>,
    timeout: Duration,
    credential: Option<Arc<ServiceCredential>>,
}

impl PermissionDelegate {
    pub fn new(config: &PermissionConfig, credential: Option<Arc<ServiceCredential>>) -> Self {
        let base = config.service_url.trim_end_matches('/');
        Self {
            client: reqwest::Client::new(),
            check_url: (!base.is_empty()).then(|| format!("{}{}", base, CHECK_PATH)),
            timeout: Duration::from_millis(config.timeout_ms),
            credential,
        }
    }

    /// Decide whether `identity` holds `permission`.
    pub async fn check(&self, identity: &IdentityClaims, permission: &Permission) -> PermissionDecision {
        if permission.granted_by(&identity.permissions) {
            return PermissionDecision {
                allowed: true,
                reason: None,
                source: DecisionSource::Token,
            };
        }

        match call_with_policy(
            "permission_service",
            FailurePolicy::FailClosed,
            self.timeout,
            self.ask_service(identity, permission),
        )
        .await
        {
            Guarded::Completed(response) => PermissionDecision {
                allowed: response.allowed,
                reason: response.reason,
                source: DecisionSource::Service,
            },
            Guarded::Degraded { admit, reason } => PermissionDecision {
                allowed: admit,
                reason: Some(format!("permission service unavailable: {}", reason)),
                source: DecisionSource::Policy,
            },
        }
    }

    async fn ask_service(
        &self,
        identity: &IdentityClaims,
        permission: &Permission,
    ) -> Result<CheckResponse, PermissionError> {
        let url = self.check_url.as_deref().ok_or(PermissionError::NotConfigured)?;
        let body = CheckRequest {
            user_id: &identity.user_id,
            tenant_id: identity.tenant_id.as_deref(),
            resource_type: &permission.resource_type,
            resource_id: permission.resource_id.as_deref(),
            action: &permission.action,
        };

        let mut request = self.client.post(url).json(&body);
        if let Some(credential) = &self.credential {
            request = request.bearer_auth(credential.bearer().as_str());
        }

        let response = request.send().await?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(PermissionError::Status(response.status().as_u16()));
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| PermissionError::Malformed(e.to_string()))
    }
}
