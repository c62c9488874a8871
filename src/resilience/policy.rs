//! Fail-open / fail-closed resolution of dependency failures.
//!
//! The rate limiter calls the store with [`FailurePolicy::FailOpen`]; the
//! permission delegate calls its service with [`FailurePolicy::FailClosed`].

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;

/// What a component does when a dependency call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Admit the request.
    FailOpen,
    /// Deny the request.
    FailClosed,
}

impl FailurePolicy {
    /// Whether a failed call resolves to admission.
    pub fn admits(self) -> bool {
        matches!(self, FailurePolicy::FailOpen)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailurePolicy::FailOpen => "fail_open",
            FailurePolicy::FailClosed => "fail_closed",
        }
    }
}

/// Outcome of a policy-guarded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    /// The dependency answered.
    Completed(T),
    /// The dependency failed; `admit` is the policy's verdict.
    Degraded { admit: bool, reason: String },
}

impl<T> Guarded<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Guarded::Degraded { .. })
    }
}

/// Run a dependency call under a deadline and resolve failures by policy.
pub async fn call_with_policy<T, E, F>(
    component: &'static str,
    policy: FailurePolicy,
    deadline: Duration,
    fut: F,
) -> Guarded<T>
where
    E: fmt::Display,
    F: Future<Output = Result<T, E>>,
{
    match with_deadline(deadline, fut).await {
        Ok(value) => Guarded::Completed(value),
        Err(e) => {
            let reason = e.to_string();
            tracing::warn!(
                component,
                policy = policy.as_str(),
                error = %reason,
                "Dependency call failed"
            );
            metrics::record_dependency_failure(component, policy.as_str());
            Guarded::Degraded {
                admit: policy.admits(),
                reason,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_policy_resolves_failures() {
        let failing = || async { Err::<u32, _>("store down") };

        let open = call_with_policy("test", FailurePolicy::FailOpen, Duration::from_secs(1), failing()).await;
        assert!(matches!(open, Guarded::Degraded { admit: true, .. }));

        let closed = call_with_policy("test", FailurePolicy::FailClosed, Duration::from_secs(1), failing()).await;
        assert!(matches!(closed, Guarded::Degraded { admit: false, .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, String>(1)
        };
        let result = call_with_policy("test", FailurePolicy::FailClosed, Duration::from_millis(20), slow).await;
        assert!(result.is_degraded());
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let result = call_with_policy("test", FailurePolicy::FailClosed, Duration::from_secs(1), async {
            Ok::<_, String>(7)
        })
        .await;
        assert_eq!(result, Guarded::Completed(7));
    }

    #[test]
    fn test_policy_serde_names() {
        let p: FailurePolicy = serde_json::from_str("\"fail_closed\"").unwrap();
        assert_eq!(p, FailurePolicy::FailClosed);
    }
}
