//! Backend MCP client pool (spec.md §4.2): one long-lived
//! [`BackendClient`] per `(namespace_id, backend_id)` pair, shared by every
//! session whose namespace includes that backend.
//!
//! Grounded on `turbomcp-proxy::proxy::backend::BackendConnector`, adapted
//! from its per-transport `AnyClient` enum to a single `Box<dyn Transport>`
//! now that `mcpgw-transport-traits` carries a blanket `Transport` impl for
//! it.

use crate::error::{GatewayError, GatewayResult};
use crate::model::{BackendId, BackendProtocol, BackendServer, NamespaceId, SessionId};
use dashmap::{DashMap, DashSet};
use mcpgw_client::{BackendClient, ClientInfo};
use mcpgw_protocol::types::{CallToolResult, GetPromptResult, Prompt, Resource, Tool};
use mcpgw_transport::{ChildProcessSpec, HttpTransport, SseTransport, StdioTransport, StreamableHttpTransport, WebSocketTransport};
use mcpgw_transport_traits::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

/// Builds the concrete transport for one backend from its registered
/// protocol (spec.md §3 `BackendServer.protocol`). For `Stdio`, `url` is
/// interpreted as a shell-style command line (`command arg1 arg2 ...`).
fn build_transport(server: &BackendServer, websocket_timeout: Duration) -> GatewayResult<Box<dyn Transport>> {
    let transport: Box<dyn Transport> = match server.protocol {
        BackendProtocol::Stdio => {
            let mut parts = server.url.split_whitespace();
            let command = parts
                .next()
                .ok_or_else(|| GatewayError::configuration(format!("empty stdio command for backend {}", server.name)))?
                .to_string();
            let args = parts.map(str::to_string).collect();
            Box::new(StdioTransport::new(ChildProcessSpec { command, args, env: Vec::new(), cwd: None }))
        }
        BackendProtocol::Http | BackendProtocol::Https => Box::new(HttpTransport::new(server.url.clone(), None)),
        BackendProtocol::Sse => Box::new(SseTransport::new(server.url.clone())),
        BackendProtocol::Ws => Box::new(WebSocketTransport::new(server.url.clone(), websocket_timeout)),
    };
    Ok(transport)
}

/// One pooled backend connection: a `BackendClient` gated by a single-flight
/// dispatch lock plus a per-request timeout. `BackendClient`'s underlying
/// `ProtocolClient` already demuxes replies by JSON-RPC id (so several
/// requests could race over the transport and each get its own reply);
/// the gate here is a deliberate policy choice, not a correctness
/// requirement — it bounds how many outstanding requests a single backend
/// can owe this pool at once, matching one dispatch per `call_tool`/etc.
/// from `Router`.
pub struct BackendConnection {
    client: BackendClient<Box<dyn Transport>>,
    dispatch_gate: AsyncMutex<()>,
    request_timeout: Duration,
    liveness: std::sync::atomic::AtomicBool,
    last_error: parking_lot::Mutex<Option<String>>,
}

macro_rules! dispatch {
    ($self:ident, $call:expr) => {{
        let _guard = $self.dispatch_gate.lock().await;
        let outcome = tokio::time::timeout($self.request_timeout, $call).await;
        match outcome {
            Ok(Ok(value)) => {
                $self.liveness.store(true, std::sync::atomic::Ordering::Relaxed);
                Ok(value)
            }
            Ok(Err(e)) => {
                $self.liveness.store(false, std::sync::atomic::Ordering::Relaxed);
                let err = GatewayError::from(e);
                *$self.last_error.lock() = Some(err.to_string());
                Err(err)
            }
            Err(_elapsed) => {
                $self.liveness.store(false, std::sync::atomic::Ordering::Relaxed);
                let err = GatewayError::timeout("backend dispatch", $self.request_timeout.as_millis() as u64);
                *$self.last_error.lock() = Some(err.to_string());
                Err(err)
            }
        }
    }};
}

impl BackendConnection {
    async fn connect(transport: Box<dyn Transport>, request_timeout: Duration) -> GatewayResult<Self> {
        let client = BackendClient::with_client_info(Arc::new(transport), ClientInfo::default());
        client.initialize().await.map_err(GatewayError::from)?;
        Ok(Self {
            client,
            dispatch_gate: AsyncMutex::new(()),
            request_timeout,
            liveness: std::sync::atomic::AtomicBool::new(true),
            last_error: parking_lot::Mutex::new(None),
        })
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.liveness.load(std::sync::atomic::Ordering::Relaxed)
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.client.pending_count()
    }

    pub async fn list_tools(&self) -> GatewayResult<Vec<Tool>> {
        dispatch!(self, self.client.list_tools())
    }

    pub async fn call_tool(&self, name: &str, arguments: Option<HashMap<String, serde_json::Value>>) -> GatewayResult<CallToolResult> {
        dispatch!(self, self.client.call_tool(name, arguments))
    }

    pub async fn list_resources(&self) -> GatewayResult<Vec<Resource>> {
        dispatch!(self, self.client.list_resources())
    }

    pub async fn read_resource(&self, uri: &str) -> GatewayResult<Vec<mcpgw_protocol::types::ResourceContents>> {
        dispatch!(self, self.client.read_resource(uri))
    }

    pub async fn list_prompts(&self) -> GatewayResult<Vec<Prompt>> {
        dispatch!(self, self.client.list_prompts())
    }

    pub async fn get_prompt(&self, name: &str, arguments: Option<HashMap<String, serde_json::Value>>) -> GatewayResult<GetPromptResult> {
        dispatch!(self, self.client.get_prompt(name, arguments))
    }

    pub async fn ping(&self) -> GatewayResult<()> {
        dispatch!(self, self.client.ping())
    }

    pub async fn call_raw(&self, method: &str, params: Option<serde_json::Value>) -> GatewayResult<serde_json::Value> {
        dispatch!(self, self.client.call_raw(method, params))
    }

    pub async fn shutdown(&self) -> GatewayResult<()> {
        self.client.shutdown().await.map_err(GatewayError::from)
    }
}

struct PoolEntry {
    connection: Arc<BackendConnection>,
    referencing_sessions: DashSet<SessionId>,
}

/// Keyed by `(namespace_id, backend_id)` (spec.md §3 `BackendConnection`
/// "Owned by the pool"). Entries are reference-counted by the set of
/// sessions currently holding them; releasing the last reference leaves
/// the connection warm for reuse rather than tearing it down immediately
/// (spec.md §4.2 "Close session").
#[derive(Default)]
pub struct ConnectionPool {
    entries: DashMap<(NamespaceId, BackendId), Arc<PoolEntry>>,
    websocket_timeout: Duration,
    request_timeout: Duration,
}

impl ConnectionPool {
    #[must_use]
    pub fn new(websocket_timeout: Duration, request_timeout: Duration) -> Self {
        Self { entries: DashMap::new(), websocket_timeout, request_timeout }
    }

    /// Acquires the connection for `(namespace_id, backend.id)`, creating
    /// and initializing one if none exists yet, and records `session_id`
    /// as a referencing session.
    pub async fn acquire(
        &self,
        namespace_id: NamespaceId,
        backend: &BackendServer,
        session_id: SessionId,
    ) -> GatewayResult<Arc<BackendConnection>> {
        let key = (namespace_id, backend.id);
        if let Some(entry) = self.entries.get(&key) {
            entry.referencing_sessions.insert(session_id);
            return Ok(entry.connection.clone());
        }

        let transport = build_transport(backend, self.websocket_timeout)?;
        let connection = Arc::new(BackendConnection::connect(transport, self.request_timeout).await?);
        let entry = Arc::new(PoolEntry { connection: connection.clone(), referencing_sessions: DashSet::new() });
        entry.referencing_sessions.insert(session_id);
        self.entries.insert(key, entry);
        Ok(connection)
    }

    #[must_use]
    pub fn get(&self, namespace_id: NamespaceId, backend_id: BackendId) -> Option<Arc<BackendConnection>> {
        self.entries.get(&(namespace_id, backend_id)).map(|e| e.connection.clone())
    }

    /// Removes `session_id` from the connection's referencing set. The
    /// connection itself is left warm even once unreferenced; call
    /// [`Self::evict_unreferenced`] to actually tear such entries down
    /// (spec.md §4.2 "pool may keep them warm if another session still
    /// uses them").
    pub fn release(&self, namespace_id: NamespaceId, backend_id: BackendId, session_id: SessionId) {
        if let Some(entry) = self.entries.get(&(namespace_id, backend_id)) {
            entry.referencing_sessions.remove(&session_id);
        }
    }

    /// Tears down and removes every connection with no referencing
    /// sessions left; returns how many were evicted.
    pub async fn evict_unreferenced(&self) -> usize {
        let stale: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.referencing_sessions.is_empty())
            .map(|e| *e.key())
            .collect();
        for key in &stale {
            if let Some((_, entry)) = self.entries.remove(key) {
                let _ = entry.connection.shutdown().await;
            }
        }
        stale.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of every pooled connection, for the admin surface (spec.md
    /// §6 "active connections, pending requests ... per backend").
    #[must_use]
    pub fn pool_stats(&self) -> Vec<PoolStats> {
        self.entries
            .iter()
            .map(|entry| {
                let (namespace_id, backend_id) = *entry.key();
                PoolStats {
                    namespace_id,
                    backend_id,
                    referencing_sessions: entry.referencing_sessions.len(),
                    pending_requests: entry.connection.pending_count(),
                    is_alive: entry.connection.is_alive(),
                    last_error: entry.connection.last_error(),
                }
            })
            .collect()
    }
}

/// One pooled connection's stats, as surfaced by [`ConnectionPool::pool_stats`].
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub namespace_id: NamespaceId,
    pub backend_id: BackendId,
    pub referencing_sessions: usize,
    pub pending_requests: usize,
    pub is_alive: bool,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OrgId;

    fn sample_backend(protocol: BackendProtocol, url: &str) -> BackendServer {
        BackendServer {
            id: BackendId::new(),
            org: OrgId::new(),
            name: "backend1".into(),
            url: url.into(),
            protocol,
            weight: 1,
            health_url: None,
            timeout: Duration::from_secs(5),
            max_retries: 2,
            metadata: HashMap::new(),
            status: crate::model::BackendStatus::Active,
            is_active: true,
        }
    }

    #[test]
    fn build_transport_rejects_empty_stdio_command() {
        let backend = sample_backend(BackendProtocol::Stdio, "   ");
        assert!(build_transport(&backend, Duration::from_secs(30)).is_err());
    }

    #[test]
    fn build_transport_accepts_stdio_command_with_args() {
        let backend = sample_backend(BackendProtocol::Stdio, "python server.py --flag");
        assert!(build_transport(&backend, Duration::from_secs(30)).is_ok());
    }

    #[test]
    fn build_transport_accepts_http_backend() {
        let backend = sample_backend(BackendProtocol::Https, "https://backend.example/mcp");
        assert!(build_transport(&backend, Duration::from_secs(30)).is_ok());
    }

    #[test]
    fn pool_starts_empty() {
        let pool = ConnectionPool::new(Duration::from_secs(30), Duration::from_secs(30));
        assert!(pool.is_empty());
    }
}
