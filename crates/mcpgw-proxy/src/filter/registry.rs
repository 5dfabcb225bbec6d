//! `FilterType -> FilterFactory` registry (spec.md §4.8), modeled after
//! the `transport_type -> TransportFactory` pattern.

use crate::filter::chain::Filter;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identifies a kind of filter a factory can construct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterType(pub String);

impl FilterType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// Constructs [`Filter`] instances for one [`FilterType`] from a JSON
/// configuration blob.
pub trait FilterFactory: Send + Sync + std::fmt::Debug {
    fn filter_type(&self) -> FilterType;
    fn create(&self, config: serde_json::Value) -> Result<Box<dyn Filter>, String>;
}

/// Process-global, read-mostly after start-up: factories are registered
/// once during configuration loading, then looked up on every filter
/// chain rebuild.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    factories: DashMap<FilterType, Arc<dyn FilterFactory>>,
}

impl FilterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, factory: Arc<dyn FilterFactory>) {
        self.factories.insert(factory.filter_type(), factory);
    }

    #[must_use]
    pub fn create(&self, filter_type: &FilterType, config: serde_json::Value) -> Option<Result<Box<dyn Filter>, String>> {
        self.factories.get(filter_type).map(|f| f.create(config))
    }

    #[must_use]
    pub fn is_registered(&self, filter_type: &FilterType) -> bool {
        self.factories.contains_key(filter_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::chain::{FilterContext, FilterDirection, FilterResult};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct NoopFactory;

    struct NoopFilter;
    #[async_trait]
    impl Filter for NoopFilter {
        fn name(&self) -> &str {
            "noop"
        }
        fn priority(&self) -> i32 {
            0
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
            (FilterResult::default(), Some(content))
        }
    }

    impl FilterFactory for NoopFactory {
        fn filter_type(&self) -> FilterType {
            FilterType::new("noop")
        }
        fn create(&self, _config: serde_json::Value) -> Result<Box<dyn Filter>, String> {
            Ok(Box::new(NoopFilter))
        }
    }

    #[test]
    fn unregistered_type_yields_none() {
        let registry = FilterRegistry::new();
        assert!(registry.create(&FilterType::new("missing"), serde_json::Value::Null).is_none());
    }

    #[test]
    fn registered_factory_constructs_a_filter() {
        let registry = FilterRegistry::new();
        registry.register(Arc::new(NoopFactory));
        assert!(registry.is_registered(&FilterType::new("noop")));
        let result = registry.create(&FilterType::new("noop"), serde_json::Value::Null).unwrap();
        assert!(result.is_ok());
    }
}
