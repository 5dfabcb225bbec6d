//! Filter chain (spec.md §4.8).
//!
//! A `FilterType -> FilterFactory` registry mirrors the
//! `transport_type -> TransportFactory` pattern used for transport
//! construction: a tag identifies a kind, a factory produces instances,
//! and the registry is populated once at start-up and read thereafter.

mod chain;
mod registry;

pub use chain::{Filter, FilterAction, FilterChain, FilterContext, FilterDirection, FilterResult, FilterStats};
pub use registry::{FilterFactory, FilterRegistry, FilterType};
