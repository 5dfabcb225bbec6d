//! Load balancing across replica backends within a namespace (spec.md
//! §4.4).
//!
//! The balancer only ever sees candidates the caller has already filtered
//! to `status=active` and circuit-breaker-not-open (spec.md §4.4 "Only
//! replicas with status=active and whose circuit breaker is not open
//! participate"); an empty candidate list is the caller's signal to raise
//! `no_healthy_backend`, not this module's concern.

use crate::model::BackendId;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancerAlgorithm {
    RoundRobin,
    LeastConn,
    Weighted,
    Random,
}

#[derive(Debug, Default)]
struct ReplicaStats {
    active_requests: AtomicU64,
    total_requests: AtomicU64,
    error_requests: AtomicU64,
    weight: AtomicU64,
    /// Exponentially-weighted moving average latency, in milliseconds.
    latency_ewma_ms: Mutex<f64>,
}

const EWMA_ALPHA: f64 = 0.2;

/// Per-namespace (really: per logical-target) balancer state. One
/// instance is shared by every request routed to the same replica set.
#[derive(Debug)]
pub struct LoadBalancer {
    algorithm: LoadBalancerAlgorithm,
    stats: DashMap<BackendId, Arc<ReplicaStats>>,
    round_robin_counter: AtomicUsize,
}

impl LoadBalancer {
    #[must_use]
    pub fn new(algorithm: LoadBalancerAlgorithm) -> Self {
        Self {
            algorithm,
            stats: DashMap::new(),
            round_robin_counter: AtomicUsize::new(0),
        }
    }

    pub fn register_backend(&self, id: BackendId, weight: u32) {
        self.stats
            .entry(id)
            .or_insert_with(|| Arc::new(ReplicaStats::default()))
            .weight
            .store(u64::from(weight), Ordering::Relaxed);
    }

    fn stats_for(&self, id: BackendId) -> Arc<ReplicaStats> {
        self.stats
            .entry(id)
            .or_insert_with(|| Arc::new(ReplicaStats::default()))
            .clone()
    }

    /// Selects one backend from `candidates` per the configured
    /// algorithm. Returns `None` only when `candidates` is empty.
    #[must_use]
    pub fn select(&self, candidates: &[BackendId]) -> Option<BackendId> {
        if candidates.is_empty() {
            return None;
        }
        match self.algorithm {
            LoadBalancerAlgorithm::RoundRobin => {
                let i = self.round_robin_counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
                Some(candidates[i])
            }
            LoadBalancerAlgorithm::LeastConn => self.select_least_conn(candidates),
            LoadBalancerAlgorithm::Weighted => self.select_weighted(candidates),
            LoadBalancerAlgorithm::Random => {
                let i = fastrand::usize(..candidates.len());
                Some(candidates[i])
            }
        }
    }

    fn select_least_conn(&self, candidates: &[BackendId]) -> Option<BackendId> {
        candidates
            .iter()
            .copied()
            .min_by(|&a, &b| {
                let sa = self.stats_for(a);
                let sb = self.stats_for(b);
                let active_cmp = sa
                    .active_requests
                    .load(Ordering::Relaxed)
                    .cmp(&sb.active_requests.load(Ordering::Relaxed));
                if active_cmp != std::cmp::Ordering::Equal {
                    return active_cmp;
                }
                let total_cmp = sa
                    .total_requests
                    .load(Ordering::Relaxed)
                    .cmp(&sb.total_requests.load(Ordering::Relaxed));
                if total_cmp != std::cmp::Ordering::Equal {
                    return total_cmp;
                }
                // Further ties broken by weight: higher weight wins, so
                // reverse the natural ordering.
                sb.weight.load(Ordering::Relaxed).cmp(&sa.weight.load(Ordering::Relaxed))
            })
    }

    fn select_weighted(&self, candidates: &[BackendId]) -> Option<BackendId> {
        let weighted: Vec<(BackendId, u64)> = candidates
            .iter()
            .map(|&id| (id, self.stats_for(id).weight.load(Ordering::Relaxed)))
            .filter(|(_, w)| *w > 0)
            .collect();
        if weighted.is_empty() {
            // All candidates are weight 0; fall back to uniform random
            // rather than returning no backend for an otherwise-healthy
            // candidate set.
            let i = fastrand::usize(..candidates.len());
            return Some(candidates[i]);
        }
        let total: u64 = weighted.iter().map(|(_, w)| w).sum();
        let mut pick = fastrand::u64(..total);
        for (id, w) in weighted {
            if pick < w {
                return Some(id);
            }
            pick -= w;
        }
        None
    }

    /// Call when a dispatch to `id` begins.
    pub fn on_dispatch_start(&self, id: BackendId) {
        let stats = self.stats_for(id);
        stats.active_requests.fetch_add(1, Ordering::Relaxed);
        stats.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Call when a dispatch to `id` completes, successfully or not.
    pub fn on_dispatch_end(&self, id: BackendId, success: bool, latency: Duration) {
        let stats = self.stats_for(id);
        stats.active_requests.fetch_sub(1, Ordering::Relaxed);
        if !success {
            stats.error_requests.fetch_add(1, Ordering::Relaxed);
        }
        let sample = latency.as_secs_f64() * 1000.0;
        let mut ewma = stats.latency_ewma_ms.lock();
        *ewma = if *ewma == 0.0 { sample } else { EWMA_ALPHA * sample + (1.0 - EWMA_ALPHA) * *ewma };
    }

    #[must_use]
    pub fn active_requests(&self, id: BackendId) -> u64 {
        self.stats_for(id).active_requests.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn latency_ewma_ms(&self, id: BackendId) -> f64 {
        *self.stats_for(id).latency_ewma_ms.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_backends() -> (LoadBalancer, Vec<BackendId>) {
        let lb = LoadBalancer::new(LoadBalancerAlgorithm::RoundRobin);
        let ids: Vec<BackendId> = (0..3).map(|_| BackendId::new()).collect();
        for id in &ids {
            lb.register_backend(*id, 1);
        }
        (lb, ids)
    }

    #[test]
    fn round_robin_cycles_through_all_candidates() {
        let (lb, ids) = three_backends();
        let picks: Vec<_> = (0..6).map(|_| lb.select(&ids).unwrap()).collect();
        assert_eq!(picks[0], ids[0]);
        assert_eq!(picks[1], ids[1]);
        assert_eq!(picks[2], ids[2]);
        assert_eq!(picks[3], ids[0]);
    }

    #[test]
    fn empty_candidates_yields_none() {
        let lb = LoadBalancer::new(LoadBalancerAlgorithm::RoundRobin);
        assert!(lb.select(&[]).is_none());
    }

    #[test]
    fn least_conn_prefers_backend_with_fewer_active_requests() {
        let lb = LoadBalancer::new(LoadBalancerAlgorithm::LeastConn);
        let ids: Vec<BackendId> = (0..2).map(|_| BackendId::new()).collect();
        for id in &ids {
            lb.register_backend(*id, 1);
        }
        lb.on_dispatch_start(ids[0]);
        lb.on_dispatch_start(ids[0]);
        lb.on_dispatch_start(ids[1]);
        assert_eq!(lb.select(&ids), Some(ids[1]));
    }

    #[test]
    fn weight_zero_backend_is_excluded_from_weighted_selection() {
        let lb = LoadBalancer::new(LoadBalancerAlgorithm::Weighted);
        let keep = BackendId::new();
        let excluded = BackendId::new();
        lb.register_backend(keep, 10);
        lb.register_backend(excluded, 0);
        for _ in 0..50 {
            assert_eq!(lb.select(&[keep, excluded]), Some(keep));
        }
    }

    #[test]
    fn random_selection_always_returns_a_candidate() {
        let lb = LoadBalancer::new(LoadBalancerAlgorithm::Random);
        let ids: Vec<BackendId> = (0..4).map(|_| BackendId::new()).collect();
        for _ in 0..20 {
            assert!(ids.contains(&lb.select(&ids).unwrap()));
        }
    }

    #[test]
    fn dispatch_end_decrements_active_and_updates_latency_ewma() {
        let lb = LoadBalancer::new(LoadBalancerAlgorithm::RoundRobin);
        let id = BackendId::new();
        lb.register_backend(id, 1);
        lb.on_dispatch_start(id);
        assert_eq!(lb.active_requests(id), 1);
        lb.on_dispatch_end(id, true, Duration::from_millis(50));
        assert_eq!(lb.active_requests(id), 0);
        assert!((lb.latency_ewma_ms(id) - 50.0).abs() < 1e-9);
    }
}
