//! Bootstrap data for the router: backends, virtual servers, and
//! namespaces loaded from a TOML file at startup.
//!
//! The admin REST surface (spec.md §6) is the intended way to manage this
//! data at runtime, but its CRUD handlers are request/response types only
//! (SPEC_FULL.md §6 "not a running HTTP router") — this file is how a
//! `serve` invocation gets a router populated with something to route to.

use crate::error::{CliError, CliResult};
use mcpgw_proxy::model::{BackendServer, Namespace, VirtualServerSpec};
use mcpgw_proxy::ratelimit::RateLimitPolicy;
use mcpgw_proxy::router::Router;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct GatewaySeed {
    #[serde(default)]
    pub backends: Vec<BackendServer>,
    #[serde(default)]
    pub virtual_servers: Vec<VirtualServerSpec>,
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
    /// Rate-limit policy table (spec.md §4.7); evaluated in descending
    /// `priority` order by `mcpgw_proxy::ratelimit::select_policy`.
    #[serde(default)]
    pub rate_limit_policies: Vec<RateLimitPolicy>,
}

impl GatewaySeed {
    pub async fn load(path: &std::path::Path) -> CliResult<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        toml::from_str(&raw).map_err(|e| CliError::configuration(format!("invalid seed file: {e}")))
    }

    /// Registers every backend, virtual server, and namespace with `router`.
    pub fn apply(&self, router: &Router) {
        for backend in &self.backends {
            router.register_backend(backend.clone());
        }
        for spec in &self.virtual_servers {
            router.register_virtual_server(spec.clone());
        }
        for namespace in &self.namespaces {
            router.register_namespace(namespace.clone());
        }
    }
}
