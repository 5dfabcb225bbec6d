//! Background health-check loop (spec.md §4.6): probes every registered
//! backend's `health_url` on a fixed interval and writes status
//! transitions back through the router.

use mcpgw_proxy::balancer::health::{HealthChecker, HealthTransition, ProbeOutcome, Prober};
use mcpgw_proxy::model::BackendId;
use mcpgw_proxy::router::Router;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

struct HttpProber {
    client: reqwest::Client,
    router: Arc<Router>,
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    /// A backend with no `health_url` is assumed healthy; this lets
    /// stdio/virtual-server-only deployments skip HTTP probing entirely.
    async fn probe(&self, backend: BackendId, timeout: Duration) -> ProbeOutcome {
        let Some(target) = self.router.backends_snapshot().into_iter().find(|b| b.id == backend) else {
            return ProbeOutcome::Failure;
        };
        let Some(health_url) = target.health_url else {
            return ProbeOutcome::Success;
        };
        match self.client.get(&health_url).timeout(timeout).send().await {
            Ok(resp) if resp.status().is_success() => ProbeOutcome::Success,
            Ok(resp) => {
                debug!(backend = %backend, status = %resp.status(), "health probe returned non-2xx");
                ProbeOutcome::Failure
            }
            Err(err) => {
                warn!(backend = %backend, %err, "health probe request failed");
                ProbeOutcome::Failure
            }
        }
    }
}

/// Runs forever, probing every registered backend every `interval` and
/// applying whatever status transition the probe implies (spec.md §4.6
/// "health checks run out-of-band from the request path").
pub async fn run(
    router: Arc<Router>,
    failure_threshold: u32,
    recovery_threshold: u32,
    interval: Duration,
    request_timeout: Duration,
) {
    let checker = HealthChecker::new(failure_threshold, recovery_threshold);
    let prober = HttpProber { client: reqwest::Client::new(), router: router.clone() };
    let probe_timeout = HealthChecker::probe_timeout(request_timeout, interval);
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        for backend in router.backends_snapshot() {
            let outcome = prober.probe(backend.id, probe_timeout).await;
            let transition = checker.record(backend.id, outcome);
            if transition != HealthTransition::NoChange {
                let new_status = HealthChecker::apply_transition(backend.status, transition);
                router.set_backend_status(backend.id, new_status);
            }
        }
    }
}
