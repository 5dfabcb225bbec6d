//! `RateLimitStore`: the atomic counter storage shared by all three
//! algorithms (spec.md §4.7).

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Snapshot returned alongside every check, independent of algorithm —
/// these become the `X-RateLimit-*` response headers (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: u64,
}

#[derive(Debug, Clone)]
pub(super) enum CounterEntry {
    Fixed { window_start_ms: i64, count: u64 },
    Sliding { timestamps_ms: Vec<i64> },
    TokenBucket { tokens: f64, last_refill_ms: i64 },
}

/// Storage backend for rate-limit counters. Implementations must make
/// `fixed_window_check`/`sliding_window_check`/`token_bucket_check`
/// atomic with respect to concurrent callers on the same key (spec.md
/// §4.7).
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn fixed_window_check(&self, key: &str, limit: u64, window: Duration) -> (bool, Usage);
    async fn sliding_window_check(&self, key: &str, limit: u64, window: Duration) -> (bool, Usage);
    async fn token_bucket_check(&self, key: &str, limit: u64, window: Duration) -> (bool, Usage);
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

/// Sharded (by `DashMap`'s own sharding) in-memory store with periodic GC
/// of stale entries, mirroring the `turbomcp-auth` limiter's
/// `maybe_cleanup` sweep.
pub struct InMemoryRateLimitStore {
    entries: DashMap<String, CounterEntry>,
    cleanup_interval: Duration,
    last_cleanup_ms: Mutex<i64>,
}

impl InMemoryRateLimitStore {
    #[must_use]
    pub fn new(cleanup_interval: Duration) -> Self {
        Self { entries: DashMap::new(), cleanup_interval, last_cleanup_ms: Mutex::new(now_ms()) }
    }

    /// Removes entries whose window closed more than `2 * window` ago
    /// (spec.md §4.7 "GC").
    fn maybe_cleanup(&self, window: Duration) {
        let now = now_ms();
        let mut last = self.last_cleanup_ms.lock();
        if now - *last < self.cleanup_interval.as_millis() as i64 {
            return;
        }
        *last = now;
        drop(last);
        let stale_before = now - 2 * window.as_millis() as i64;
        self.entries.retain(|_, entry| match entry {
            CounterEntry::Fixed { window_start_ms, .. } => *window_start_ms >= stale_before,
            CounterEntry::Sliding { timestamps_ms } => {
                timestamps_ms.last().copied().unwrap_or(0) >= stale_before
            }
            CounterEntry::TokenBucket { last_refill_ms, .. } => *last_refill_ms >= stale_before,
        });
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn fixed_window_check(&self, key: &str, limit: u64, window: Duration) -> (bool, Usage) {
        self.maybe_cleanup(window);
        let now = now_ms();
        let window_ms = window.as_millis() as i64;
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| CounterEntry::Fixed {
            window_start_ms: now,
            count: 0,
        });
        let CounterEntry::Fixed { window_start_ms, count } = &mut *entry else {
            unreachable!("key reused across algorithms")
        };
        if now - *window_start_ms >= window_ms {
            *window_start_ms = now;
            *count = 0;
        }
        let reset_at = (*window_start_ms + window_ms) / 1000;
        if *count >= limit {
            return (false, Usage { limit, remaining: 0, reset_at: reset_at.max(0) as u64 });
        }
        *count += 1;
        let remaining = limit - *count;
        (true, Usage { limit, remaining, reset_at: reset_at.max(0) as u64 })
    }

    async fn sliding_window_check(&self, key: &str, limit: u64, window: Duration) -> (bool, Usage) {
        self.maybe_cleanup(window);
        let now = now_ms();
        let window_ms = window.as_millis() as i64;
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| CounterEntry::Sliding { timestamps_ms: Vec::new() });
        let CounterEntry::Sliding { timestamps_ms } = &mut *entry else {
            unreachable!("key reused across algorithms")
        };
        let cutoff = now - window_ms;
        timestamps_ms.retain(|&t| t > cutoff);
        let reset_at = ((timestamps_ms.first().copied().unwrap_or(now)) + window_ms) / 1000;
        if timestamps_ms.len() as u64 >= limit {
            return (false, Usage { limit, remaining: 0, reset_at: reset_at.max(0) as u64 });
        }
        timestamps_ms.push(now);
        let remaining = limit - timestamps_ms.len() as u64;
        (true, Usage { limit, remaining, reset_at: reset_at.max(0) as u64 })
    }

    async fn token_bucket_check(&self, key: &str, limit: u64, window: Duration) -> (bool, Usage) {
        self.maybe_cleanup(window);
        let now = now_ms();
        let window_ms = window.as_millis().max(1) as i64;
        let refill_rate = limit as f64 / window_ms as f64; // tokens per ms
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| CounterEntry::TokenBucket {
            tokens: limit as f64,
            last_refill_ms: now,
        });
        let CounterEntry::TokenBucket { tokens, last_refill_ms } = &mut *entry else {
            unreachable!("key reused across algorithms")
        };
        let elapsed = (now - *last_refill_ms).max(0) as f64;
        *tokens = (*tokens + elapsed * refill_rate).min(limit as f64);
        *last_refill_ms = now;
        let reset_at = (now + window_ms) / 1000;
        if *tokens < 1.0 {
            return (false, Usage { limit, remaining: 0, reset_at: reset_at.max(0) as u64 });
        }
        *tokens -= 1.0;
        (true, Usage { limit, remaining: tokens.floor() as u64, reset_at: reset_at.max(0) as u64 })
    }
}

#[cfg(feature = "redis")]
mod redis_store {
    use super::{Duration, RateLimitStore, Usage};
    use async_trait::async_trait;
    use redis::AsyncCommands;

    /// Redis-compatible store using Lua-free `INCR`/`PEXPIRE` pairs for
    /// the fixed-window algorithm; sliding window and token bucket use
    /// sorted sets / hashes respectively (spec.md §4.7 "Redis-compatible").
    pub struct RedisRateLimitStore {
        client: redis::Client,
    }

    impl RedisRateLimitStore {
        pub fn new(client: redis::Client) -> Self {
            Self { client }
        }

        async fn conn(&self) -> redis::RedisResult<redis::aio::MultiplexedConnection> {
            self.client.get_multiplexed_async_connection().await
        }
    }

    #[async_trait]
    impl RateLimitStore for RedisRateLimitStore {
        async fn fixed_window_check(&self, key: &str, limit: u64, window: Duration) -> (bool, Usage) {
            let Ok(mut conn) = self.conn().await else {
                return (true, Usage { limit, remaining: limit, reset_at: 0 });
            };
            let redis_key = format!("mcpgw:rl:fw:{key}");
            let count: i64 = match conn.incr(&redis_key, 1).await {
                Ok(c) => c,
                Err(_) => return (true, Usage { limit, remaining: limit, reset_at: 0 }),
            };
            if count == 1 {
                let _: Result<(), _> = conn.pexpire(&redis_key, window.as_millis() as i64).await;
            }
            let ttl: i64 = conn.pttl(&redis_key).await.unwrap_or(window.as_millis() as i64);
            let reset_at = (chrono::Utc::now().timestamp_millis() + ttl) / 1000;
            if count as u64 > limit {
                (false, Usage { limit, remaining: 0, reset_at: reset_at.max(0) as u64 })
            } else {
                (true, Usage { limit, remaining: limit - count as u64, reset_at: reset_at.max(0) as u64 })
            }
        }

        async fn sliding_window_check(&self, key: &str, limit: u64, window: Duration) -> (bool, Usage) {
            let Ok(mut conn) = self.conn().await else {
                return (true, Usage { limit, remaining: limit, reset_at: 0 });
            };
            let redis_key = format!("mcpgw:rl:sw:{key}");
            let now = chrono::Utc::now().timestamp_millis();
            let cutoff = now - window.as_millis() as i64;
            let _: Result<(), _> = conn.zrembyscore(&redis_key, 0, cutoff).await;
            let count: u64 = conn.zcard(&redis_key).await.unwrap_or(0);
            let reset_at = (now + window.as_millis() as i64) / 1000;
            if count >= limit {
                return (false, Usage { limit, remaining: 0, reset_at: reset_at.max(0) as u64 });
            }
            let _: Result<(), _> = conn.zadd(&redis_key, now, now).await;
            let _: Result<(), _> = conn.pexpire(&redis_key, window.as_millis() as i64).await;
            (true, Usage { limit, remaining: limit - count - 1, reset_at: reset_at.max(0) as u64 })
        }

        async fn token_bucket_check(&self, key: &str, limit: u64, window: Duration) -> (bool, Usage) {
            // Same semantics as fixed_window at the Redis layer; the finer
            // continuous-refill behavior is only available in-process.
            self.fixed_window_check(key, limit, window).await
        }
    }
}

#[cfg(feature = "redis")]
pub use redis_store::RedisRateLimitStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_window_resets_remaining_after_the_window_closes() {
        let store = InMemoryRateLimitStore::new(Duration::from_secs(300));
        let (ok, usage) = store.fixed_window_check("k", 1, Duration::from_millis(10)).await;
        assert!(ok);
        assert_eq!(usage.remaining, 0);
        let (ok2, _) = store.fixed_window_check("k", 1, Duration::from_millis(10)).await;
        assert!(!ok2);
        tokio::time::sleep(Duration::from_millis(15)).await;
        let (ok3, _) = store.fixed_window_check("k", 1, Duration::from_millis(10)).await;
        assert!(ok3);
    }

    #[tokio::test]
    async fn sliding_window_blocks_once_limit_reached_within_window() {
        let store = InMemoryRateLimitStore::new(Duration::from_secs(300));
        assert!(store.sliding_window_check("k", 2, Duration::from_secs(60)).await.0);
        assert!(store.sliding_window_check("k", 2, Duration::from_secs(60)).await.0);
        assert!(!store.sliding_window_check("k", 2, Duration::from_secs(60)).await.0);
    }

    #[tokio::test]
    async fn token_bucket_depletes_then_refills_over_time() {
        let store = InMemoryRateLimitStore::new(Duration::from_secs(300));
        assert!(store.token_bucket_check("k", 1, Duration::from_millis(10)).await.0);
        assert!(!store.token_bucket_check("k", 1, Duration::from_millis(10)).await.0);
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(store.token_bucket_check("k", 1, Duration::from_millis(10)).await.0);
    }
}
