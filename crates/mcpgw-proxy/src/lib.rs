//! mcpgw-proxy: gateway core.
//!
//! Namespace/session data model, backend connection pool, method-table
//! router, health-aware load balancer with circuit breakers, rate
//! limiter, filter chain, and virtual-server adapters for non-MCP
//! backends. Everything the external interfaces in `mcpgw-cli` need to
//! serve a namespace to a client is assembled here.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod adapters;
pub mod balancer;
pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod model;
pub mod namespace;
pub mod pool;
pub mod ratelimit;
pub mod router;
pub mod session;

pub use error::{GatewayError, GatewayResult};

/// Prelude of the types most callers need to assemble a running gateway.
pub mod prelude {
    pub use crate::balancer::{CircuitBreaker, HealthChecker, LoadBalancer, LoadBalancerAlgorithm};
    pub use crate::config::GatewayConfig;
    pub use crate::error::{GatewayError, GatewayResult};
    pub use crate::filter::{Filter, FilterChain};
    pub use crate::model::{BackendId, BackendServer, Namespace, NamespaceId, Session, SessionId};
    pub use crate::pool::ConnectionPool;
    pub use crate::ratelimit::RateLimiter;
    pub use crate::router::Router;
    pub use crate::session::SessionRegistry;
}

/// Gateway implementation version, surfaced in synthesized `initialize`
/// responses.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
