//! Periodic health prober feeding the circuit breaker and load balancer
//! (spec.md §4.6).
//!
//! Health checks MUST NOT contribute to request-path load counters
//! (spec.md §4.6) — the prober calls `mcpgw-client` directly rather than
//! going through the balancer's `on_dispatch_start`/`on_dispatch_end`.

use crate::model::{BackendId, BackendStatus};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Streaks {
    success: AtomicU32,
    failure: AtomicU32,
}

/// A single health probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success,
    Failure,
}

/// Probes a backend and reports success/failure; implemented by an MCP
/// `ping` over `mcpgw-client` or an HTTP GET of `health_check_url`
/// (spec.md §4.6).
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, backend: BackendId, timeout: Duration) -> ProbeOutcome;
}

/// Tracks consecutive success/failure streaks per backend and decides
/// when a status transition fires.
#[derive(Debug)]
pub struct HealthChecker {
    failure_threshold: u32,
    recovery_threshold: u32,
    streaks: DashMap<BackendId, Arc<Streaks>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    BecameUnhealthy,
    Recovered,
    NoChange,
}

impl HealthChecker {
    #[must_use]
    pub fn new(failure_threshold: u32, recovery_threshold: u32) -> Self {
        Self { failure_threshold, recovery_threshold, streaks: DashMap::new() }
    }

    fn streaks_for(&self, id: BackendId) -> Arc<Streaks> {
        self.streaks.entry(id).or_insert_with(|| Arc::new(Streaks::default())).clone()
    }

    /// Folds one probe result into the backend's streak counters and
    /// returns the status transition (if any) the caller should apply to
    /// `BackendServer.status`.
    pub fn record(&self, id: BackendId, outcome: ProbeOutcome) -> HealthTransition {
        let streaks = self.streaks_for(id);
        match outcome {
            ProbeOutcome::Success => {
                streaks.failure.store(0, Ordering::Relaxed);
                let successes = streaks.success.fetch_add(1, Ordering::Relaxed) + 1;
                if successes == self.recovery_threshold {
                    debug!(backend = %id, "health check recovered");
                    HealthTransition::Recovered
                } else {
                    HealthTransition::NoChange
                }
            }
            ProbeOutcome::Failure => {
                streaks.success.store(0, Ordering::Relaxed);
                let failures = streaks.failure.fetch_add(1, Ordering::Relaxed) + 1;
                if failures == self.failure_threshold {
                    warn!(backend = %id, "health check marking backend unhealthy");
                    HealthTransition::BecameUnhealthy
                } else {
                    HealthTransition::NoChange
                }
            }
        }
    }

    /// Probes `backend` and returns the timeout to use: `min(timeout,
    /// health_interval / 2)` per spec.md §4.6.
    #[must_use]
    pub fn probe_timeout(timeout: Duration, health_interval: Duration) -> Duration {
        timeout.min(health_interval / 2)
    }

    /// Applies a transition to a status value, leaving any status other
    /// than `Active`/`Unhealthy` untouched (e.g. `Maintenance` is only
    /// ever set by an admin, never by health checks).
    #[must_use]
    pub fn apply_transition(current: BackendStatus, transition: HealthTransition) -> BackendStatus {
        match (current, transition) {
            (BackendStatus::Active, HealthTransition::BecameUnhealthy) => BackendStatus::Unhealthy,
            (BackendStatus::Unhealthy, HealthTransition::Recovered) => BackendStatus::Active,
            (other, _) => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_timeout_is_the_smaller_of_the_two_bounds() {
        assert_eq!(
            HealthChecker::probe_timeout(Duration::from_secs(30), Duration::from_secs(10)),
            Duration::from_secs(5)
        );
        assert_eq!(
            HealthChecker::probe_timeout(Duration::from_secs(2), Duration::from_secs(10)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn consecutive_failures_reach_threshold_exactly_once() {
        let hc = HealthChecker::new(3, 2);
        let id = BackendId::new();
        assert_eq!(hc.record(id, ProbeOutcome::Failure), HealthTransition::NoChange);
        assert_eq!(hc.record(id, ProbeOutcome::Failure), HealthTransition::NoChange);
        assert_eq!(hc.record(id, ProbeOutcome::Failure), HealthTransition::BecameUnhealthy);
        // threshold already crossed; further failures report no *new* transition
        assert_eq!(hc.record(id, ProbeOutcome::Failure), HealthTransition::NoChange);
    }

    #[test]
    fn a_success_in_between_resets_the_failure_streak() {
        let hc = HealthChecker::new(3, 2);
        let id = BackendId::new();
        hc.record(id, ProbeOutcome::Failure);
        hc.record(id, ProbeOutcome::Failure);
        hc.record(id, ProbeOutcome::Success);
        assert_eq!(hc.record(id, ProbeOutcome::Failure), HealthTransition::NoChange);
        assert_eq!(hc.record(id, ProbeOutcome::Failure), HealthTransition::NoChange);
    }

    #[test]
    fn recovery_after_threshold_successes() {
        let hc = HealthChecker::new(3, 2);
        let id = BackendId::new();
        assert_eq!(hc.record(id, ProbeOutcome::Success), HealthTransition::NoChange);
        assert_eq!(hc.record(id, ProbeOutcome::Success), HealthTransition::Recovered);
    }

    #[test]
    fn apply_transition_only_moves_between_active_and_unhealthy() {
        assert_eq!(
            HealthChecker::apply_transition(BackendStatus::Active, HealthTransition::BecameUnhealthy),
            BackendStatus::Unhealthy
        );
        assert_eq!(
            HealthChecker::apply_transition(BackendStatus::Maintenance, HealthTransition::BecameUnhealthy),
            BackendStatus::Maintenance
        );
    }
}
