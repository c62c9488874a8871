//! Synthetic dependency probes.
//!
//! Every probe runs under its own deadline and all probes of a report run
//! concurrently. Nothing is cached: each call re-probes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use futures_util::future::join_all;

use crate::auth::blacklist::TokenBlacklist;
use crate::auth::token::{fresh_claims, TokenValidator};
use crate::config::{HealthConfig, StoreConfig};
use crate::health::status::{
    derive_overall, HealthReport, LivenessReport, ProbeReport, ProbeStatus, ReadinessReport,
};
use crate::observability::metrics;
use crate::resilience::with_deadline;
use crate::store::Store;

type ProbeFuture<'a> = Pin<Box<dyn Future<Output = ProbeReport> + Send + 'a>>;

const PROBE_SUBJECT: &str = "health-probe";

pub struct HealthAggregator {
    store: Arc<dyn Store>,
    validator: Arc<TokenValidator>,
    blacklist: Arc<TokenBlacklist>,
    client: reqwest::Client,
    auth_service_url: Option<String>,
    probe_timeout: Duration,
    store_timeout: Duration,
    started: Instant,
}

impl HealthAggregator {
    pub fn new(
        store: Arc<dyn Store>,
        validator: Arc<TokenValidator>,
        blacklist: Arc<TokenBlacklist>,
        health: &HealthConfig,
        store_config: &StoreConfig,
    ) -> Self {
        let base = health.auth_service_url.trim_end_matches('/');
        Self {
            store,
            validator,
            blacklist,
            client: reqwest::Client::new(),
            auth_service_url: (!base.is_empty()).then(|| base.to_string()),
            probe_timeout: Duration::from_millis(health.probe_timeout_ms),
            store_timeout: Duration::from_millis(store_config.op_timeout_ms),
            started: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Full dependency report.
    pub async fn health(&self) -> HealthReport {
        let probes: Vec<ProbeFuture<'_>> = vec![
            Box::pin(probe("store", true, self.store_timeout, self.store_ping())),
            Box::pin(probe("token_signing", true, self.probe_timeout, self.signing_round_trip())),
            Box::pin(probe("session_store", false, self.store_timeout, self.session_round_trip())),
            Box::pin(probe("token_blacklist", false, self.store_timeout, self.blacklist_round_trip())),
            Box::pin(self.auth_service_probe()),
        ];
        let checks = join_all(probes).await;
        let status = derive_overall(&checks);
        if !status.is_healthy() {
            tracing::warn!(status = ?status, "Health check not healthy");
        }

        HealthReport {
            status,
            timestamp: now_rfc3339(),
            uptime_secs: self.uptime().as_secs(),
            version: env!("CARGO_PKG_VERSION"),
            checks,
        }
    }

    /// Whether traffic should be routed here now.
    pub async fn readiness(&self) -> ReadinessReport {
        let probes: Vec<ProbeFuture<'_>> = vec![
            Box::pin(probe("store", true, self.store_timeout, self.store_ping())),
            Box::pin(probe("secret", true, self.probe_timeout, self.secret_configured())),
            Box::pin(probe("token_signing", true, self.probe_timeout, self.signing_round_trip())),
        ];
        let checks = join_all(probes).await;
        ReadinessReport {
            ready: !checks.iter().any(ProbeReport::is_down),
            timestamp: now_rfc3339(),
            checks,
        }
    }

    pub fn liveness(&self) -> LivenessReport {
        LivenessReport {
            status: "alive",
            uptime_secs: self.uptime().as_secs(),
        }
    }

    async fn store_ping(&self) -> Result<(), String> {
        self.store.ping().await.map_err(|e| e.to_string())
    }

    async fn secret_configured(&self) -> Result<(), String> {
        if self.validator.can_sign() {
            Ok(())
        } else {
            Err("no signing secret configured".to_string())
        }
    }

    async fn signing_round_trip(&self) -> Result<(), String> {
        let claims = fresh_claims(PROBE_SUBJECT, "health@gateway.local", None, None, 60);
        let token = self.validator.sign(&claims).map_err(|e| e.to_string())?;
        let verified = self.validator.validate(&token).map_err(|e| e.to_string())?;
        if verified.user_id != PROBE_SUBJECT {
            return Err("round-tripped subject mismatch".to_string());
        }
        Ok(())
    }

    async fn session_round_trip(&self) -> Result<(), String> {
        let key = format!("health:session:{}", uuid::Uuid::new_v4());
        self.store
            .set_ex(&key, "probe", Duration::from_secs(30))
            .await
            .map_err(|e| e.to_string())?;
        let read = self.store.get(&key).await.map_err(|e| e.to_string())?;
        self.store.del(&key).await.map_err(|e| e.to_string())?;
        match read.as_deref() {
            Some("probe") => Ok(()),
            _ => Err("session round-trip read back a different value".to_string()),
        }
    }

    async fn blacklist_round_trip(&self) -> Result<(), String> {
        let key = format!("blacklist:health:{}", uuid::Uuid::new_v4());
        self.blacklist
            .revoke_key(&key, Duration::from_secs(30))
            .await
            .map_err(|e| e.to_string())?;
        let revoked = self.blacklist.is_revoked_key(&key).await.map_err(|e| e.to_string())?;
        self.blacklist.forget_key(&key).await.map_err(|e| e.to_string())?;
        if !revoked {
            return Err("blacklist entry not visible after write".to_string());
        }
        Ok(())
    }

    async fn auth_service_probe(&self) -> ProbeReport {
        let Some(base) = &self.auth_service_url else {
            return ProbeReport {
                name: "auth_service",
                status: ProbeStatus::Skipped,
                critical: false,
                latency_ms: 0,
                error: None,
            };
        };
        let url = format!("{}/health", base);
        probe("auth_service", false, self.probe_timeout, async {
            let response = self.client.get(&url).send().await.map_err(|e| e.to_string())?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(format!("auth service answered {}", response.status().as_u16()))
            }
        })
        .await
    }
}

/// Run one check under a deadline and time it.
async fn probe<F>(name: &'static str, critical: bool, deadline: Duration, check: F) -> ProbeReport
where
    F: Future<Output = Result<(), String>>,
{
    let start = Instant::now();
    let result = with_deadline(deadline, check).await;
    metrics::record_probe(name, start);
    let latency_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(()) => ProbeReport {
            name,
            status: ProbeStatus::Up,
            critical,
            latency_ms,
            error: None,
        },
        Err(e) => {
            tracing::warn!(probe = name, critical, error = %e, "Health probe failed");
            ProbeReport {
                name,
                status: ProbeStatus::Down,
                critical,
                latency_ms,
                error: Some(e.to_string()),
            }
        }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
