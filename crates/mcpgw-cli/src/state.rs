//! Shared application state handed to every axum handler.

use mcpgw_proxy::config::GatewayConfig;
use mcpgw_proxy::filter::FilterChain;
use mcpgw_proxy::model::NamespaceId;
use mcpgw_proxy::ratelimit::{RateLimitPolicy, RateLimiter};
use mcpgw_proxy::router::Router;
use mcpgw_proxy::session::SessionRegistry;
use mcpgw_proxy::{GatewayError, GatewayResult};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    pub sessions: Arc<SessionRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub rate_limit_policies: Arc<Vec<RateLimitPolicy>>,
    pub filters: Arc<FilterChain>,
    pub config: Arc<GatewayConfig>,
    /// Namespace used when a request's params carry no `server_id`.
    pub default_namespace: NamespaceId,
}

impl AppState {
    /// Resolves the namespace a request targets: `params.server_id`, if
    /// present, is looked up by namespace name or by raw UUID; otherwise
    /// the gateway's default namespace is used (spec.md §6 "an optional
    /// `server_id` in params selects [a] namespace").
    pub fn resolve_namespace(&self, params: Option<&serde_json::Value>) -> GatewayResult<NamespaceId> {
        let Some(server_id) = params.and_then(|p| p.get("server_id")).and_then(|v| v.as_str()) else {
            return Ok(self.default_namespace);
        };
        if let Ok(uuid) = server_id.parse::<uuid::Uuid>() {
            return Ok(NamespaceId(uuid));
        }
        self.router
            .namespace_id_by_name(server_id)
            .ok_or_else(|| GatewayError::routing(format!("unknown namespace {server_id}")))
    }
}
