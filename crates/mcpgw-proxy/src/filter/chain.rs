//! `Filter` trait and `FilterChain` execution (spec.md §4.8).

use crate::model::{BackendId, NamespaceId, SessionId};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Which leg of a request a filter inspects (spec.md §4.8 "supported
/// directions").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterDirection {
    Inbound,
    Outbound,
}

/// What a filter decided to do with the content it inspected (spec.md
/// §4.8 `FilterResult.action`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterAction {
    Allow,
    Modify,
    Block,
}

/// Outcome of one filter's `apply` call (spec.md §4.8).
#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    pub blocked: bool,
    pub modified: bool,
    pub violations: Vec<String>,
    pub action: Option<FilterAction>,
}

/// Request-scoped context threaded through every filter in the chain
/// (spec.md §5 "conveyed to filters via the filter context").
#[derive(Debug, Clone)]
pub struct FilterContext {
    pub session_id: SessionId,
    pub namespace_id: NamespaceId,
    pub backend_id: Option<BackendId>,
    pub method: String,
    pub cancellation: CancellationToken,
}

/// One filter instance (spec.md §4.8).
#[async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;
    fn priority(&self) -> i32;
    fn enabled(&self) -> bool;
    fn directions(&self) -> &[FilterDirection];
    /// Content types this filter applies to; empty means "all" (spec.md
    /// §4.8 "supported content types (empty set => all)").
    fn content_types(&self) -> &[String];

    async fn apply(
        &self,
        ctx: &FilterContext,
        content: serde_json::Value,
    ) -> (FilterResult, Option<serde_json::Value>);
}

fn filter_applies(filter: &dyn Filter, direction: FilterDirection, content_type: &str) -> bool {
    filter.enabled()
        && filter.directions().contains(&direction)
        && (filter.content_types().is_empty() || filter.content_types().iter().any(|c| c == content_type))
}

#[derive(Debug, Default)]
struct FilterStatsInner {
    invocations: AtomicU64,
    violations: AtomicU64,
    errors: AtomicU64,
    total_latency_micros: AtomicU64,
}

/// Per-filter counters the manager updates after every invocation
/// (spec.md §4.8 "All filters that ran update per-filter stats").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub invocations: u64,
    pub violations: u64,
    pub errors: u64,
    pub total_latency_micros: u64,
}

/// Sorts enabled, applicable filters by ascending priority and runs them
/// in sequence, threading the (possibly modified) content from one filter
/// to the next (spec.md §4.8).
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
    stats: DashMap<String, FilterStatsInner>,
}

impl FilterChain {
    #[must_use]
    pub fn new(mut filters: Vec<Box<dyn Filter>>) -> Self {
        filters.sort_by_key(|f| f.priority());
        Self { filters, stats: DashMap::new() }
    }

    #[must_use]
    pub fn stats_for(&self, name: &str) -> FilterStats {
        self.stats
            .get(name)
            .map(|s| FilterStats {
                invocations: s.invocations.load(Ordering::Relaxed),
                violations: s.violations.load(Ordering::Relaxed),
                errors: s.errors.load(Ordering::Relaxed),
                total_latency_micros: s.total_latency_micros.load(Ordering::Relaxed),
            })
            .unwrap_or_default()
    }

    /// Runs the chain against `content`. Returns the merged result and
    /// the final content (original if nothing modified it). A filter
    /// whose result is `blocked` with `action=Block` short-circuits the
    /// remaining chain (spec.md §4.8).
    pub async fn apply(
        &self,
        ctx: &FilterContext,
        direction: FilterDirection,
        content_type: &str,
        content: serde_json::Value,
    ) -> (FilterResult, serde_json::Value) {
        let mut current = content;
        let mut merged = FilterResult::default();

        for filter in &self.filters {
            if !filter_applies(filter.as_ref(), direction, content_type) {
                continue;
            }
            let entry = self.stats.entry(filter.name().to_string()).or_default();
            let start = Instant::now();
            let (result, modified) = filter.apply(ctx, current.clone()).await;
            record_stats(&entry, start.elapsed(), &result);

            merged.violations.extend(result.violations.clone());
            if let Some(new_content) = modified {
                current = new_content;
                merged.modified = true;
            }
            if result.blocked && matches!(result.action, Some(FilterAction::Block)) {
                merged.blocked = true;
                merged.action = Some(FilterAction::Block);
                return (merged, current);
            }
            if result.action.is_some() {
                merged.action = result.action;
            }
        }
        (merged, current)
    }
}

fn record_stats(entry: &FilterStatsInner, elapsed: Duration, result: &FilterResult) {
    entry.invocations.fetch_add(1, Ordering::Relaxed);
    entry.total_latency_micros.fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    if !result.violations.is_empty() {
        entry.violations.fetch_add(result.violations.len() as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct AllowAll;
    #[async_trait]
    impl Filter for AllowAll {
        fn name(&self) -> &str {
            "allow_all"
        }
        fn priority(&self) -> i32 {
            10
        }
        fn enabled(&self) -> bool {
            true
        }
        fn directions(&self) -> &[FilterDirection] {
            &[FilterDirection::Inbound, FilterDirection::Outbound]
        }
        fn content_types(&self) -> &[String] {
            &[]
        }
        async fn apply(&self, _ctx: &FilterContext, _content: serde_json::Value) -> (FilterResult, Option<serde_json::Value>) {
            (FilterResult { action: Some(FilterAction::Allow), ..Default::default() }, None)
        }
    }

    struct Redactor;
    #[async_trait]
    impl Filter for Redactor {
        fn name(&self) -> &str {
            "redactor"
        }
        fn priority(&self) -> i32 {
            20
        }
        fn enabled(&self) -> bool {
            true
        }
        fn directions(&self) -> &[FilterDirection] {
            &[FilterDirection::Outbound]
        }
        fn content_types(&self) -> &[String] {
            &[]
        }
        async fn apply(&self, _ctx: &FilterContext, _content: serde_json::Value) -> (FilterResult, Option<serde_json::Value>) {
            (
                FilterResult {
                    modified: true,
                    violations: vec!["redacted secret".into()],
                    action: Some(FilterAction::Modify),
                    ..Default::default()
                },
                Some(json!({"redacted": true})),
            )
        }
    }

    struct Blocker;
    #[async_trait]
    impl Filter for Blocker {
        fn name(&self) -> &str {
            "blocker"
        }
        fn priority(&self) -> i32 {
            5
        }
        fn enabled(&self) -> bool {
            true
        }
        fn directions(&self) -> &[FilterDirection] {
            &[FilterDirection::Inbound]
        }
        fn content_types(&self) -> &[String] {
            &[]
        }
        async fn apply(&self, _ctx: &FilterContext, content: serde_json::Value) -> (FilterResult, Option<serde_json::Value>) {
            (
                FilterResult {
                    blocked: true,
                    violations: vec!["blocked".into()],
                    action: Some(FilterAction::Block),
                    ..Default::default()
                },
                Some(content),
            )
        }
    }

    fn ctx() -> FilterContext {
        FilterContext {
            session_id: SessionId::new(),
            namespace_id: NamespaceId::new(),
            backend_id: None,
            method: "tools/call".into(),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn chain_threads_modified_content_to_the_next_filter() {
        let chain = FilterChain::new(vec![Box::new(AllowAll), Box::new(Redactor)]);
        let (result, content) = chain.apply(&ctx(), FilterDirection::Outbound, "json", json!({"a": 1})).await;
        assert!(result.modified);
        assert_eq!(content, json!({"redacted": true}));
    }

    #[tokio::test]
    async fn blocking_filter_short_circuits_the_chain() {
        let chain = FilterChain::new(vec![Box::new(Blocker), Box::new(Redactor)]);
        let (result, _) = chain.apply(&ctx(), FilterDirection::Inbound, "json", json!({"a": 1})).await;
        assert!(result.blocked);
        assert_eq!(result.action, Some(FilterAction::Block));
        // redactor must not have run: its violation would otherwise appear
        assert_eq!(result.violations, vec!["blocked".to_string()]);
    }

    #[tokio::test]
    async fn filters_not_matching_direction_are_skipped() {
        let chain = FilterChain::new(vec![Box::new(Redactor)]);
        let (result, content) = chain.apply(&ctx(), FilterDirection::Inbound, "json", json!({"a": 1})).await;
        assert!(!result.modified);
        assert_eq!(content, json!({"a": 1}));
    }

    #[tokio::test]
    async fn stats_accumulate_invocations_and_violations() {
        let chain = FilterChain::new(vec![Box::new(Redactor)]);
        chain.apply(&ctx(), FilterDirection::Outbound, "json", json!({})).await;
        chain.apply(&ctx(), FilterDirection::Outbound, "json", json!({})).await;
        let stats = chain.stats_for("redactor");
        assert_eq!(stats.invocations, 2);
        assert_eq!(stats.violations, 2);
    }
}
