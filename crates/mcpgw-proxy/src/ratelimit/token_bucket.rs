use super::store::{RateLimitStore, Usage};
use std::time::Duration;

pub(super) async fn check_and_increment(
    store: &dyn RateLimitStore,
    key: &str,
    limit: u64,
    window: Duration,
) -> (bool, Usage) {
    store.token_bucket_check(key, limit, window).await
}
