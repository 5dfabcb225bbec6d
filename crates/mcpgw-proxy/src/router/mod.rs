//! Method-table router / namespace aggregator (spec.md §4.3).
//!
//! Grounded on `turbomcp-proxy::proxy::router::CapabilityRouter`, widened
//! from its 1:1 frontend/backend shape to fan-out across every backend a
//! namespace aggregates, with prefix parsing and replica selection via
//! [`crate::balancer`].

use crate::adapters::rest::{self, SecretStore};
use crate::balancer::{CircuitBreaker, LoadBalancer};
use crate::config::BackendValidationConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::events::{EventChannel, GatewayEvent};
use crate::model::{AdapterType, BackendId, BackendServer, Namespace, NamespaceId, SessionId, VirtualServerSpec};
use crate::namespace::{parse_prefixed_name, prefix_tool_name, sanitize};
use crate::pool::ConnectionPool;
use chrono::Utc;
use dashmap::DashMap;
use mcpgw_protocol::PROTOCOL_VERSION;
use mcpgw_protocol::types::{
    CallToolResult, Content, GetPromptResult, Implementation, InitializeResult, Prompt, Resource,
    ServerCapabilities, Tool,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of namespaces, backends, and virtual-server specs, plus the
/// pool/balancer/breaker state the router consults on every dispatch.
pub struct Router {
    namespaces: DashMap<NamespaceId, Namespace>,
    backends: DashMap<BackendId, BackendServer>,
    virtual_servers: DashMap<BackendId, VirtualServerSpec>,
    pool: ConnectionPool,
    breaker: CircuitBreaker,
    balancers: DashMap<(NamespaceId, String), Arc<LoadBalancer>>,
    balancer_algorithm: crate::balancer::LoadBalancerAlgorithm,
    http_client: reqwest::Client,
    backend_validation: BackendValidationConfig,
    events: EventChannel<GatewayEvent>,
}

impl Router {
    #[must_use]
    pub fn new(
        pool: ConnectionPool,
        breaker: CircuitBreaker,
        balancer_algorithm: crate::balancer::LoadBalancerAlgorithm,
        backend_validation: BackendValidationConfig,
    ) -> Self {
        Self {
            namespaces: DashMap::new(),
            backends: DashMap::new(),
            virtual_servers: DashMap::new(),
            pool,
            breaker,
            balancers: DashMap::new(),
            balancer_algorithm,
            http_client: reqwest::Client::new(),
            backend_validation,
            events: EventChannel::new(),
        }
    }

    /// Subscribes to circuit-breaker and health-status transitions (spec.md
    /// §4.4/§4.5/§4.6), on the same bounded-channel mechanism as session
    /// events (see [`crate::session::SessionRegistry::subscribe`]).
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    pub fn register_namespace(&self, namespace: Namespace) {
        self.namespaces.insert(namespace.id, namespace);
    }

    pub fn register_backend(&self, backend: BackendServer) {
        self.backends.insert(backend.id, backend);
    }

    pub fn register_virtual_server(&self, spec: VirtualServerSpec) {
        self.virtual_servers.insert(spec.id, spec);
    }

    fn namespace(&self, id: NamespaceId) -> GatewayResult<Namespace> {
        self.namespaces
            .get(&id)
            .map(|n| n.clone())
            .ok_or_else(|| GatewayError::routing(format!("unknown namespace {id}")))
    }

    fn backend(&self, id: BackendId) -> Option<BackendServer> {
        self.backends.get(&id).map(|b| b.clone())
    }

    /// Snapshot of every registered backend, for the health prober and the
    /// admin surface (spec.md §6).
    #[must_use]
    pub fn backends_snapshot(&self) -> Vec<BackendServer> {
        self.backends.iter().map(|b| b.clone()).collect()
    }

    /// Snapshot of every registered namespace, for the admin surface and
    /// for resolving a client-supplied namespace name to its id.
    #[must_use]
    pub fn namespaces_snapshot(&self) -> Vec<Namespace> {
        self.namespaces.iter().map(|n| n.clone()).collect()
    }

    /// Looks up a namespace by its human-readable name (spec.md §6 "an
    /// optional `server_id` in params selects [a] namespace").
    #[must_use]
    pub fn namespace_id_by_name(&self, name: &str) -> Option<NamespaceId> {
        self.namespaces.iter().find(|n| n.name == name).map(|n| n.id)
    }

    /// Applies a health-check status transition (spec.md §4.6). A no-op if
    /// the backend is unknown.
    pub fn set_backend_status(&self, id: BackendId, status: crate::model::BackendStatus) {
        if let Some(mut backend) = self.backends.get_mut(&id) {
            backend.status = status;
            drop(backend);
            self.events.publish(GatewayEvent::BackendStatusChanged { backend_id: id, status });
        }
    }

    /// Read-only access to the pool's connection stats (spec.md §6 admin
    /// surface).
    #[must_use]
    pub fn pool_stats(&self) -> Vec<crate::pool::PoolStats> {
        self.pool.pool_stats()
    }

    /// Tears down pooled connections no session references anymore,
    /// returning the number evicted (spec.md §5 step 6 idle sweep).
    pub async fn evict_idle_connections(&self) -> usize {
        self.pool.evict_unreferenced().await
    }

    /// Eagerly acquires (and thereby `initialize`-handshakes, see
    /// `BackendConnection::connect`) a pooled connection to every
    /// routable, non-virtual member of `namespace_id` (spec.md §4.2 step
    /// 3). Returns the backend ids that initialized successfully.
    ///
    /// A member that fails to initialize is tolerated only when the
    /// namespace has `soft_init=true`, in which case it's marked
    /// unhealthy and excluded from the result rather than failing the
    /// whole call; otherwise the first failure is returned immediately.
    pub async fn initialize_namespace_backends(
        &self,
        namespace_id: NamespaceId,
        session_id: SessionId,
    ) -> GatewayResult<Vec<BackendId>> {
        let namespace = self.namespace(namespace_id)?;
        let mut connected = Vec::new();
        for member in &namespace.members {
            let Some(server) = self.backend(*member) else { continue };
            if !server.is_routable() || self.virtual_servers.contains_key(member) {
                continue;
            }
            match self.pool.acquire(namespace_id, &server, session_id).await {
                Ok(_) => connected.push(*member),
                Err(err) => {
                    if namespace.soft_init {
                        self.set_backend_status(*member, crate::model::BackendStatus::Unhealthy);
                    } else {
                        return Err(err);
                    }
                }
            }
        }
        Ok(connected)
    }

    fn balancer_for(&self, namespace_id: NamespaceId, sanitized_name: &str) -> Arc<LoadBalancer> {
        self.balancers
            .entry((namespace_id, sanitized_name.to_string()))
            .or_insert_with(|| Arc::new(LoadBalancer::new(self.balancer_algorithm)))
            .clone()
    }

    /// Resolves a sanitized backend name within `namespace` to one live
    /// replica: candidates are members whose sanitized name matches and
    /// are routable, filtered further by circuit-breaker availability,
    /// then narrowed to one via the load balancer (spec.md §4.4 "Only
    /// replicas with status=active and whose circuit breaker is not open
    /// participate").
    fn select_replica(&self, namespace: &Namespace, sanitized_name: &str) -> GatewayResult<BackendId> {
        let now = Utc::now();
        let mut candidates = Vec::new();
        let mut routable_matches = 0usize;
        let mut breaker_excluded = 0usize;
        for member in &namespace.members {
            let Some(server) = self.backend(*member) else { continue };
            if sanitize(&server.name) != sanitized_name || !server.is_routable() {
                continue;
            }
            routable_matches += 1;
            if self.breaker.try_acquire(*member, now).is_ok() {
                candidates.push(*member);
            } else {
                breaker_excluded += 1;
            }
        }
        let balancer = self.balancer_for(namespace.id, sanitized_name);
        for id in &candidates {
            if let Some(server) = self.backend(*id) {
                balancer.register_backend(*id, server.weight);
            }
        }
        if let Some(id) = balancer.select(&candidates) {
            return Ok(id);
        }
        // Every name-matching, routable member was filtered by the circuit
        // breaker specifically: -32000/circuit_open rather than the
        // generic no_healthy_backend (spec.md §8 scenario 4).
        if routable_matches > 0 && breaker_excluded == routable_matches {
            return Err(GatewayError::CircuitOpen { backend: sanitized_name.to_string() });
        }
        Err(GatewayError::NoHealthyBackend { namespace: namespace.name.clone() })
    }

    fn record_outcome(&self, backend_id: BackendId, success: bool) {
        if let Some(event) = self.breaker.record(backend_id, success, Utc::now()) {
            self.events.publish(GatewayEvent::BreakerTransition { backend_id, event });
        }
    }

    // -- tools --------------------------------------------------------

    /// `tools/list`: fan-out to every non-quarantined member, merge in
    /// declared member order, prefix each tool name (spec.md §4.3).
    pub async fn list_tools(&self, namespace_id: NamespaceId) -> GatewayResult<Vec<Tool>> {
        let namespace = self.namespace(namespace_id)?;
        let mut merged = Vec::new();
        for member in &namespace.members {
            let Some(server) = self.backend(*member) else { continue };
            if !server.is_routable() {
                continue;
            }
            let sanitized = sanitize(&server.name);
            if let Some(spec) = self.virtual_servers.get(member) {
                for tool in &spec.tools {
                    if !namespace.tool_is_visible(*member, &tool.name) {
                        continue;
                    }
                    merged.push(Tool {
                        name: prefix_tool_name(&sanitized, &tool.name),
                        description: None,
                        input_schema: mcpgw_protocol::types::ToolInputSchema(tool.input_schema.clone()),
                    });
                }
                continue;
            }
            let Some(connection) = self.pool.get(namespace_id, *member) else { continue };
            let Ok(tools) = connection.list_tools().await else { continue };
            for tool in tools {
                if !namespace.tool_is_visible(*member, &tool.name) {
                    continue;
                }
                merged.push(Tool { name: prefix_tool_name(&sanitized, &tool.name), ..tool });
            }
        }
        Ok(merged)
    }

    /// `tools/call`: parse the prefixed name, select a live replica among
    /// backends sharing that sanitized name, and dispatch to it alone
    /// (spec.md §4.3).
    pub async fn call_tool(
        &self,
        session_id: SessionId,
        namespace_id: NamespaceId,
        prefixed_name: &str,
        arguments: Option<HashMap<String, serde_json::Value>>,
    ) -> GatewayResult<CallToolResult> {
        let namespace = self.namespace(namespace_id)?;
        let (sanitized_name, tool_name) = parse_prefixed_name(prefixed_name)?;
        let backend_id = self.select_replica(&namespace, &sanitized_name)?;

        if let Some(spec) = self.virtual_servers.get(&backend_id) {
            return self.call_virtual_tool(&spec, &tool_name, arguments.unwrap_or_default()).await;
        }

        let backend = self
            .backend(backend_id)
            .ok_or_else(|| GatewayError::routing(format!("backend {backend_id} vanished mid-dispatch")))?;
        let connection = self.pool.acquire(namespace_id, &backend, session_id).await?;

        let balancer = self.balancer_for(namespace_id, &sanitized_name);
        balancer.on_dispatch_start(backend_id);
        let started = std::time::Instant::now();
        let result = connection.call_tool(&tool_name, arguments).await;
        balancer.on_dispatch_end(backend_id, result.is_ok(), started.elapsed());

        self.record_outcome(backend_id, result.is_ok());
        result
    }

    async fn call_virtual_tool(
        &self,
        spec: &VirtualServerSpec,
        tool_name: &str,
        arguments: HashMap<String, serde_json::Value>,
    ) -> GatewayResult<CallToolResult> {
        let tool = spec
            .tools
            .iter()
            .find(|t| t.name == tool_name)
            .ok_or_else(|| GatewayError::routing(format!("unknown virtual tool {tool_name}")))?;

        match spec.adapter_type {
            AdapterType::Rest => {
                let rest_spec = tool
                    .rest_call
                    .as_ref()
                    .ok_or_else(|| GatewayError::configuration(format!("virtual tool {tool_name} has no REST call spec")))?;
                let no_secrets = rest::InMemorySecretStore::new();
                let result = rest::execute(&self.http_client, rest_spec, arguments, &no_secrets, &self.backend_validation).await?;
                Ok(CallToolResult { content: vec![Content::Text { text: result.text }], is_error: result.is_error })
            }
            AdapterType::GraphQl | AdapterType::GRpc | AdapterType::Soap => {
                crate::adapters::PlaceholderAdapter::new(spec.adapter_type).call().map_err(GatewayError::from)?;
                unreachable!("placeholder adapter always errors")
            }
        }
    }

    /// Call this overload when the caller supplies its own secret store
    /// (spec.md §4.9 "`${SECRET:NAME}` substitution"). `call_tool` above
    /// uses an empty store, which only succeeds for REST specs with no
    /// secret placeholders.
    pub async fn call_virtual_tool_with_secrets(
        &self,
        backend_id: BackendId,
        tool_name: &str,
        arguments: HashMap<String, serde_json::Value>,
        secrets: &dyn SecretStore,
    ) -> GatewayResult<CallToolResult> {
        let spec = self
            .virtual_servers
            .get(&backend_id)
            .ok_or_else(|| GatewayError::routing(format!("unknown virtual server {backend_id}")))?;
        let tool = spec
            .tools
            .iter()
            .find(|t| t.name == tool_name)
            .ok_or_else(|| GatewayError::routing(format!("unknown virtual tool {tool_name}")))?;
        let rest_spec = tool
            .rest_call
            .as_ref()
            .ok_or_else(|| GatewayError::configuration(format!("virtual tool {tool_name} has no REST call spec")))?;
        let result = rest::execute(&self.http_client, rest_spec, arguments, secrets, &self.backend_validation).await?;
        Ok(CallToolResult { content: vec![Content::Text { text: result.text }], is_error: result.is_error })
    }

    // -- resources / prompts -------------------------------------------

    /// Fans out `resources/list` across every routable member, tagging each
    /// result with the backend it came from. Only a uri collision across
    /// backends earns a `sanitized_backend__uri` prefix (spec.md §4.3 "no
    /// prefixing required unless collisions; then prefix with backend
    /// sanitized name"); a uri unique to one backend passes through
    /// unprefixed.
    async fn fanout_resources(&self, namespace_id: NamespaceId) -> GatewayResult<Vec<(BackendId, String, Resource)>> {
        let namespace = self.namespace(namespace_id)?;
        let mut raw = Vec::new();
        for member in &namespace.members {
            let Some(server) = self.backend(*member) else { continue };
            if !server.is_routable() {
                continue;
            }
            let Some(connection) = self.pool.get(namespace_id, *member) else { continue };
            if let Ok(resources) = connection.list_resources().await {
                for resource in resources {
                    raw.push((*member, resource));
                }
            }
        }
        let mut counts: HashMap<String, usize> = HashMap::new();
        for (_, resource) in &raw {
            *counts.entry(resource.uri.clone()).or_insert(0) += 1;
        }
        Ok(raw
            .into_iter()
            .map(|(backend_id, resource)| {
                let original_uri = resource.uri.clone();
                let displayed = if counts[&original_uri] > 1 {
                    let sanitized = self.backend(backend_id).map(|b| sanitize(&b.name)).unwrap_or_default();
                    Resource { uri: prefix_tool_name(&sanitized, &original_uri), ..resource }
                } else {
                    resource
                };
                (backend_id, original_uri, displayed)
            })
            .collect())
    }

    pub async fn list_resources(&self, namespace_id: NamespaceId) -> GatewayResult<Vec<Resource>> {
        Ok(self.fanout_resources(namespace_id).await?.into_iter().map(|(_, _, resource)| resource).collect())
    }

    /// Dispatches to whichever backend's listing contained `uri` (spec.md
    /// §4.3 "Dispatch to the backend whose listing contained the
    /// resource/prompt URI"). `uri` may be either a plain uri (no
    /// collision across the namespace's backends) or a prefixed one
    /// (collision, as returned by [`Self::list_resources`]); either way
    /// the backend is resolved unambiguously from the same fan-out used
    /// to build the list, not by a first-match scan.
    pub async fn read_resource(
        &self,
        namespace_id: NamespaceId,
        uri: &str,
    ) -> GatewayResult<Vec<mcpgw_protocol::types::ResourceContents>> {
        let fanout = self.fanout_resources(namespace_id).await?;
        let (backend_id, original_uri) = fanout
            .iter()
            .find(|(_, _, resource)| resource.uri == uri)
            .map(|(backend_id, original_uri, _)| (*backend_id, original_uri.clone()))
            .ok_or_else(|| GatewayError::routing(format!("no backend owns resource {uri}")))?;
        let connection = self
            .pool
            .get(namespace_id, backend_id)
            .ok_or_else(|| GatewayError::routing(format!("no backend owns resource {uri}")))?;
        connection.read_resource(&original_uri).await
    }

    /// Same collision handling as [`Self::fanout_resources`], keyed on
    /// prompt name instead of uri.
    async fn fanout_prompts(&self, namespace_id: NamespaceId) -> GatewayResult<Vec<(BackendId, String, Prompt)>> {
        let namespace = self.namespace(namespace_id)?;
        let mut raw = Vec::new();
        for member in &namespace.members {
            let Some(server) = self.backend(*member) else { continue };
            if !server.is_routable() {
                continue;
            }
            let Some(connection) = self.pool.get(namespace_id, *member) else { continue };
            if let Ok(prompts) = connection.list_prompts().await {
                for prompt in prompts {
                    raw.push((*member, prompt));
                }
            }
        }
        let mut counts: HashMap<String, usize> = HashMap::new();
        for (_, prompt) in &raw {
            *counts.entry(prompt.name.clone()).or_insert(0) += 1;
        }
        Ok(raw
            .into_iter()
            .map(|(backend_id, prompt)| {
                let original_name = prompt.name.clone();
                let displayed = if counts[&original_name] > 1 {
                    let sanitized = self.backend(backend_id).map(|b| sanitize(&b.name)).unwrap_or_default();
                    Prompt { name: prefix_tool_name(&sanitized, &original_name), ..prompt }
                } else {
                    prompt
                };
                (backend_id, original_name, displayed)
            })
            .collect())
    }

    pub async fn list_prompts(&self, namespace_id: NamespaceId) -> GatewayResult<Vec<Prompt>> {
        Ok(self.fanout_prompts(namespace_id).await?.into_iter().map(|(_, _, prompt)| prompt).collect())
    }

    pub async fn get_prompt(
        &self,
        namespace_id: NamespaceId,
        name: &str,
        arguments: Option<HashMap<String, serde_json::Value>>,
    ) -> GatewayResult<GetPromptResult> {
        let fanout = self.fanout_prompts(namespace_id).await?;
        let (backend_id, original_name) = fanout
            .iter()
            .find(|(_, _, prompt)| prompt.name == name)
            .map(|(backend_id, original_name, _)| (*backend_id, original_name.clone()))
            .ok_or_else(|| GatewayError::routing(format!("no backend owns prompt {name}")))?;
        let connection = self
            .pool
            .get(namespace_id, backend_id)
            .ok_or_else(|| GatewayError::routing(format!("no backend owns prompt {name}")))?;
        connection.get_prompt(&original_name, arguments).await
    }

    // -- control plane --------------------------------------------------

    /// The gateway never forwards `initialize` verbatim; it synthesizes a
    /// response aggregating capability flags across the namespace's
    /// members (spec.md §4.3).
    pub async fn initialize(&self, namespace_id: NamespaceId) -> GatewayResult<InitializeResult> {
        let namespace = self.namespace(namespace_id)?;
        let mut capabilities = ServerCapabilities::default();
        for member in &namespace.members {
            let Some(server) = self.backend(*member) else { continue };
            if !server.is_routable() {
                continue;
            }
            if self.virtual_servers.contains_key(member) {
                capabilities.tools.get_or_insert(serde_json::json!({}));
                continue;
            }
            let Some(connection) = self.pool.get(namespace_id, *member) else { continue };
            if connection.list_tools().await.is_ok() {
                capabilities.tools.get_or_insert(serde_json::json!({}));
            }
            if connection.list_resources().await.is_ok() {
                capabilities.resources.get_or_insert(serde_json::json!({}));
            }
            if connection.list_prompts().await.is_ok() {
                capabilities.prompts.get_or_insert(serde_json::json!({}));
            }
        }
        Ok(InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities,
            server_info: Implementation { name: "mcp-gateway".to_string(), version: env!("CARGO_PKG_VERSION").to_string() },
        })
    }

    /// `ping`: answered locally, never forwarded (spec.md §4.3).
    #[must_use]
    pub fn ping(&self) -> serde_json::Value {
        serde_json::json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() })
    }

    /// `completion/complete`: dispatched to the namespace's designated
    /// sampling backend; `-32601` (via [`GatewayError::routing`]) if none
    /// is configured (spec.md §4.3).
    pub async fn completion_complete(
        &self,
        namespace_id: NamespaceId,
        params: Option<serde_json::Value>,
    ) -> GatewayResult<serde_json::Value> {
        let namespace = self.namespace(namespace_id)?;
        let backend_id = namespace
            .sampling_backend
            .ok_or_else(|| GatewayError::routing("no sampling backend configured for this namespace".to_string()))?;
        let connection = self
            .pool
            .get(namespace_id, backend_id)
            .ok_or_else(|| GatewayError::routing("sampling backend has no live connection".to_string()))?;
        connection.call_raw("completion/complete", params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackendProtocol, BackendStatus, OrgId};
    use std::time::Duration;

    fn router() -> Router {
        Router::new(
            ConnectionPool::new(Duration::from_secs(30), Duration::from_secs(30)),
            CircuitBreaker::new(5, 2, Duration::from_secs(30)),
            crate::balancer::LoadBalancerAlgorithm::RoundRobin,
            BackendValidationConfig::default(),
        )
    }

    fn backend(name: &str) -> BackendServer {
        BackendServer {
            id: BackendId::new(),
            org: OrgId::new(),
            name: name.to_string(),
            url: "https://backend.example/mcp".into(),
            protocol: BackendProtocol::Https,
            weight: 1,
            health_url: None,
            timeout: Duration::from_secs(5),
            max_retries: 1,
            metadata: HashMap::new(),
            status: BackendStatus::Active,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn tools_list_on_unknown_namespace_errors() {
        let r = router();
        let err = r.list_tools(NamespaceId::new()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Routing { .. }));
    }

    #[tokio::test]
    async fn completion_complete_without_sampling_backend_is_method_not_found() {
        let r = router();
        let server = backend("s1");
        let ns = Namespace {
            id: NamespaceId::new(),
            org: server.org,
            name: "ns1".into(),
            members: vec![server.id],
            tool_overrides: Vec::new(),
            sampling_backend: None,
            soft_init: false,
        };
        let ns_id = ns.id;
        r.register_backend(server);
        r.register_namespace(ns);
        let err = r.completion_complete(ns_id, None).await.unwrap_err();
        assert_eq!(err.to_protocol_error().kind, mcpgw_protocol::error::ErrorKind::MethodNotFound);
    }

    #[tokio::test]
    async fn ping_answers_locally() {
        let r = router();
        let value = r.ping();
        assert_eq!(value["status"], "ok");
    }

    #[tokio::test]
    async fn no_routable_replica_yields_no_healthy_backend() {
        let r = router();
        let mut server = backend("s1");
        server.status = BackendStatus::Unhealthy;
        let ns = Namespace {
            id: NamespaceId::new(),
            org: server.org,
            name: "ns1".into(),
            members: vec![server.id],
            tool_overrides: Vec::new(),
            sampling_backend: None,
            soft_init: false,
        };
        let ns_id = ns.id;
        r.register_backend(server);
        r.register_namespace(ns.clone());
        let err = r.select_replica(&ns, "s1").unwrap_err();
        assert!(matches!(err, GatewayError::NoHealthyBackend { .. }));
    }

    #[tokio::test]
    async fn open_circuit_yields_circuit_open_not_no_healthy_backend() {
        let r = Router::new(
            ConnectionPool::new(Duration::from_secs(30), Duration::from_secs(30)),
            CircuitBreaker::new(1, 2, Duration::from_secs(30)),
            crate::balancer::LoadBalancerAlgorithm::RoundRobin,
            BackendValidationConfig::default(),
        );
        let server = backend("s1");
        let ns = Namespace {
            id: NamespaceId::new(),
            org: server.org,
            name: "ns1".into(),
            members: vec![server.id],
            tool_overrides: Vec::new(),
            sampling_backend: None,
            soft_init: false,
        };
        r.register_backend(server.clone());
        r.register_namespace(ns.clone());
        // failure_threshold=1: one recorded failure trips the breaker open.
        r.record_outcome(server.id, false);
        let err = r.select_replica(&ns, "s1").unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen { .. }));
    }

    #[tokio::test]
    async fn initialize_namespace_backends_on_unknown_namespace_errors() {
        let r = router();
        let err = r.initialize_namespace_backends(NamespaceId::new(), SessionId::new()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Routing { .. }));
    }

    #[tokio::test]
    async fn initialize_namespace_backends_skips_virtual_servers() {
        let r = router();
        let server = backend("v1");
        let ns = Namespace {
            id: NamespaceId::new(),
            org: server.org,
            name: "ns1".into(),
            members: vec![server.id],
            tool_overrides: Vec::new(),
            sampling_backend: None,
            soft_init: false,
        };
        let ns_id = ns.id;
        r.register_backend(server.clone());
        r.register_virtual_server(VirtualServerSpec {
            id: server.id,
            name: "v1".into(),
            adapter_type: AdapterType::Rest,
            tools: Vec::new(),
            prompts: Vec::new(),
            resources: Vec::new(),
        });
        r.register_namespace(ns);
        let connected = r.initialize_namespace_backends(ns_id, SessionId::new()).await.unwrap();
        assert!(connected.is_empty());
    }

    #[tokio::test]
    async fn set_backend_status_publishes_a_gateway_event() {
        let r = router();
        let server = backend("s1");
        let id = server.id;
        r.register_backend(server);
        let mut rx = r.subscribe();
        r.set_backend_status(id, BackendStatus::Unhealthy);
        let event = rx.recv().await.unwrap();
        assert_eq!(event, crate::events::GatewayEvent::BackendStatusChanged { backend_id: id, status: BackendStatus::Unhealthy });
    }
}
