//! Health report types and status derivation.
//!
//! # Overall status
//! ```text
//! any critical probe down      → unhealthy
//! any non-critical probe down  → degraded
//! otherwise                    → healthy
//! ```
//! Both `degraded` and `unhealthy` are served with 503; the payload tells
//! them apart.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Up,
    Down,
    /// Not configured; does not affect the overall status.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl OverallStatus {
    pub fn is_healthy(self) -> bool {
        self == OverallStatus::Healthy
    }
}

/// One dependency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub name: &'static str,
    pub status: ProbeStatus,
    pub critical: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeReport {
    pub fn is_down(&self) -> bool {
        self.status == ProbeStatus::Down
    }
}

pub fn derive_overall(checks: &[ProbeReport]) -> OverallStatus {
    if checks.iter().any(|c| c.critical && c.is_down()) {
        OverallStatus::Unhealthy
    } else if checks.iter().any(ProbeReport::is_down) {
        OverallStatus::Degraded
    } else {
        OverallStatus::Healthy
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: OverallStatus,
    pub timestamp: String,
    pub uptime_secs: u64,
    pub version: &'static str,
    pub checks: Vec<ProbeReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub timestamp: String,
    pub checks: Vec<ProbeReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LivenessReport {
    pub status: &'static str,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(critical: bool, status: ProbeStatus) -> ProbeReport {
        ProbeReport {
            name: "p",
            status,
            critical,
            latency_ms: 0,
            error: None,
        }
    }

    #[test]
    fn test_overall_status() {
        assert_eq!(derive_overall(&[]), OverallStatus::Healthy);
        assert_eq!(
            derive_overall(&[probe(true, ProbeStatus::Up), probe(false, ProbeStatus::Skipped)]),
            OverallStatus::Healthy
        );
        assert_eq!(
            derive_overall(&[probe(true, ProbeStatus::Up), probe(false, ProbeStatus::Down)]),
            OverallStatus::Degraded
        );
        assert_eq!(
            derive_overall(&[probe(true, ProbeStatus::Down), probe(false, ProbeStatus::Down)]),
            OverallStatus::Unhealthy
        );
    }
}
