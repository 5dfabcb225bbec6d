//! Request rate limiting (spec.md §4.7).
//!
//! Three algorithms share one [`RateLimitStore`] trait so the same policy
//! engine runs against an in-memory store or a Redis-compatible one.

mod fixed_window;
mod policy;
mod sliding_window;
mod store;
mod token_bucket;

pub use policy::{select_policy, LimitKeyKind, RateLimitContext, RateLimitPolicy};
pub use store::{InMemoryRateLimitStore, RateLimitStore, Usage};

#[cfg(feature = "redis")]
pub use store::RedisRateLimitStore;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Which counting algorithm a policy uses (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAlgorithm {
    FixedWindow,
    SlidingWindow,
    TokenBucket,
}

/// Outcome of a rate-limit check, carrying the `X-RateLimit-*` header
/// values regardless of whether the request was allowed (spec.md §4.7,
/// §6 "Rate-limit response headers").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub usage: Usage,
}

/// Whether `path` is exempt from rate limiting entirely (spec.md §4.7
/// "health checks and admin probes are never throttled"). Exact match,
/// not a prefix: `/healthz/live` is not exempted by `/healthz`.
#[must_use]
pub fn is_skip_path(path: &str, skip_paths: &[String]) -> bool {
    skip_paths.iter().any(|p| p == path)
}

/// Resolves the IP a rate-limit policy should key on. When
/// `trusted_ip_header` names a header and the request carried one, its
/// first comma-separated hop wins over the raw connection peer address
/// (spec.md §4.7 "trusted header override"); otherwise `socket_ip` is
/// used as-is.
#[must_use]
pub fn resolve_remote_ip(trusted_ip_header: Option<&str>, header_value: Option<&str>, socket_ip: &str) -> String {
    if trusted_ip_header.is_some() {
        if let Some(value) = header_value {
            if let Some(first_hop) = value.split(',').next() {
                let trimmed = first_hop.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
    }
    socket_ip.to_string()
}

/// Evaluates policies in priority order and enforces the first match
/// against the configured store (spec.md §4.7).
pub struct RateLimiter {
    algorithm: RateLimitAlgorithm,
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(algorithm: RateLimitAlgorithm, store: Arc<dyn RateLimitStore>) -> Self {
        Self { algorithm, store }
    }

    /// Checks `key` against `(limit, window)` using the configured
    /// algorithm, incrementing the counter as a side effect.
    pub async fn check(&self, key: &str, limit: u64, window: Duration) -> RateLimitDecision {
        let (allowed, usage) = match self.algorithm {
            RateLimitAlgorithm::FixedWindow => {
                fixed_window::check_and_increment(self.store.as_ref(), key, limit, window).await
            }
            RateLimitAlgorithm::SlidingWindow => {
                sliding_window::check_and_increment(self.store.as_ref(), key, limit, window).await
            }
            RateLimitAlgorithm::TokenBucket => {
                token_bucket::check_and_increment(self.store.as_ref(), key, limit, window).await
            }
        };
        RateLimitDecision { allowed, usage }
    }
}
