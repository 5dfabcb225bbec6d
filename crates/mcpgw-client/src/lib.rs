//! Backend MCP client: the gateway's own connection to a single backend
//! server (spec.md §4.2 "Backend client").
//!
//! A [`BackendClient`] owns one [`Transport`] and speaks MCP over it:
//! `initialize` negotiates protocol version and capabilities, after which
//! the typed operations (`list_tools`, `call_tool`, ...) are available.
//! Everything before `initialize` succeeds returns [`ClientError::NotInitialized`].

mod error;
mod protocol;

pub use error::{ClientError, ClientResult};

use mcpgw_protocol::PROTOCOL_VERSION;
use mcpgw_protocol::types::{
    CallToolRequest, CallToolResult, ClientCapabilities, GetPromptRequest, GetPromptResult,
    Implementation, InitializeRequest, InitializeResult, Prompt, ReadResourceRequest,
    Resource, ResourceContents, Tool,
};
use mcpgw_transport_traits::Transport;
use protocol::ProtocolClient;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Client identity advertised during the handshake.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "mcp-gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// The gateway's connection to one backend MCP server.
///
/// `T` is the concrete transport (stdio, HTTP, SSE, WebSocket, streamable
/// HTTP); callers in `mcpgw-proxy::pool` erase it behind a boxed trait
/// object when storing heterogeneous backend connections in the same map.
#[derive(Debug)]
pub struct BackendClient<T: Transport> {
    protocol: ProtocolClient<T>,
    client_info: ClientInfo,
    server_info: RwLock<Option<InitializeResult>>,
}

impl<T: Transport + 'static> BackendClient<T> {
    #[must_use]
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_client_info(transport, ClientInfo::default())
    }

    #[must_use]
    pub fn with_client_info(transport: Arc<T>, client_info: ClientInfo) -> Self {
        Self {
            protocol: ProtocolClient::new(transport),
            client_info,
            server_info: RwLock::new(None),
        }
    }

    pub fn transport(&self) -> &T {
        self.protocol.transport()
    }

    /// Number of requests this connection has sent and is still awaiting a
    /// correlated reply for (spec.md §6 admin surface "pending requests").
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.protocol.pending_count()
    }

    /// Subscribes to frames the receive loop couldn't match to a waiting
    /// request: server-initiated notifications from this backend.
    #[must_use]
    pub fn subscribe_notifications(&self) -> tokio::sync::broadcast::Receiver<serde_json::Value> {
        self.protocol.subscribe_notifications()
    }

    /// `true` once `initialize` has completed successfully.
    pub async fn is_initialized(&self) -> bool {
        self.server_info.read().await.is_some()
    }

    /// Returns the server's reported `InitializeResult`, if handshaked.
    pub async fn server_info(&self) -> Option<InitializeResult> {
        self.server_info.read().await.clone()
    }

    async fn ensure_initialized(&self) -> ClientResult<()> {
        if self.is_initialized().await {
            Ok(())
        } else {
            Err(ClientError::NotInitialized)
        }
    }

    /// Performs the MCP handshake (spec.md §4.2): connects the transport,
    /// sends `initialize`, then notifies `notifications/initialized`.
    pub async fn initialize(&self) -> ClientResult<InitializeResult> {
        self.protocol
            .transport()
            .connect()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let request = InitializeRequest {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities {
                sampling: None,
                roots: None,
            },
            client_info: Implementation {
                name: self.client_info.name.clone(),
                version: self.client_info.version.clone(),
            },
        };
        let params = serde_json::to_value(&request).map_err(|e| ClientError::Encode(e.to_string()))?;
        let result: InitializeResult = self.protocol.request("initialize", Some(params)).await?;

        self.protocol
            .notify("notifications/initialized", None)
            .await?;
        *self.server_info.write().await = Some(result.clone());
        Ok(result)
    }

    pub async fn list_tools(&self) -> ClientResult<Vec<Tool>> {
        self.ensure_initialized().await?;
        #[derive(serde::Deserialize)]
        struct ListToolsResult {
            tools: Vec<Tool>,
        }
        let result: ListToolsResult = self.protocol.request("tools/list", None).await?;
        Ok(result.tools)
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<HashMap<String, serde_json::Value>>,
    ) -> ClientResult<CallToolResult> {
        self.ensure_initialized().await?;
        let request = CallToolRequest {
            name: name.to_string(),
            arguments,
        };
        let params = serde_json::to_value(&request).map_err(|e| ClientError::Encode(e.to_string()))?;
        self.protocol.request("tools/call", Some(params)).await
    }

    pub async fn list_resources(&self) -> ClientResult<Vec<Resource>> {
        self.ensure_initialized().await?;
        #[derive(serde::Deserialize)]
        struct ListResourcesResult {
            resources: Vec<Resource>,
        }
        let result: ListResourcesResult = self.protocol.request("resources/list", None).await?;
        Ok(result.resources)
    }

    pub async fn read_resource(&self, uri: &str) -> ClientResult<Vec<ResourceContents>> {
        self.ensure_initialized().await?;
        #[derive(serde::Deserialize)]
        struct ReadResourceResult {
            contents: Vec<ResourceContents>,
        }
        let request = ReadResourceRequest { uri: uri.to_string() };
        let params = serde_json::to_value(&request).map_err(|e| ClientError::Encode(e.to_string()))?;
        let result: ReadResourceResult = self.protocol.request("resources/read", Some(params)).await?;
        Ok(result.contents)
    }

    pub async fn list_prompts(&self) -> ClientResult<Vec<Prompt>> {
        self.ensure_initialized().await?;
        #[derive(serde::Deserialize)]
        struct ListPromptsResult {
            prompts: Vec<Prompt>,
        }
        let result: ListPromptsResult = self.protocol.request("prompts/list", None).await?;
        Ok(result.prompts)
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, serde_json::Value>>,
    ) -> ClientResult<GetPromptResult> {
        self.ensure_initialized().await?;
        let request = GetPromptRequest {
            name: name.to_string(),
            arguments,
        };
        let params = serde_json::to_value(&request).map_err(|e| ClientError::Encode(e.to_string()))?;
        self.protocol.request("prompts/get", Some(params)).await
    }

    /// Health-check ping. A backend that doesn't implement `ping` is
    /// expected to return a `method_not_found` RPC error, which callers
    /// treat the same as a liveness failure (spec.md §4.6 health checker).
    pub async fn ping(&self) -> ClientResult<()> {
        self.ensure_initialized().await?;
        let _: serde_json::Value = self.protocol.request("ping", None).await?;
        Ok(())
    }

    /// Forwards an arbitrary method/params pair verbatim, for methods the
    /// gateway doesn't model with a typed wrapper (spec.md §4.3 passthrough).
    pub async fn call_raw(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> ClientResult<serde_json::Value> {
        self.ensure_initialized().await?;
        self.protocol.request(method, params).await
    }

    pub async fn shutdown(&self) -> ClientResult<()> {
        self.protocol
            .transport()
            .disconnect()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcpgw_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
    use mcpgw_transport_traits::{AtomicMetrics, TransportError, TransportMessage, TransportMetrics, TransportResult, TransportType};
    use tokio::sync::Mutex as TokioMutex;

    /// An in-process backend stand-in that answers `initialize`/`tools/list`/
    /// `tools/call`/`ping` the way a real MCP server would, without a socket.
    #[derive(Debug, Default)]
    struct MockBackend {
        outbound: TokioMutex<Vec<TransportMessage>>,
        connected: std::sync::atomic::AtomicBool,
        metrics: AtomicMetrics,
    }

    #[async_trait]
    impl Transport for MockBackend {
        fn transport_type(&self) -> TransportType {
            TransportType::Stdio
        }

        async fn connect(&self) -> TransportResult<()> {
            self.connected.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&self) -> TransportResult<()> {
            self.connected.store(false, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        async fn send(&self, message: TransportMessage) -> TransportResult<()> {
            let req: JsonRpcRequest = serde_json::from_slice(&message.payload)
                .map_err(|e| TransportError::Decode(e.to_string()))?;
            let Some(id) = req.id else {
                return Ok(()); // notifications get no reply
            };
            let result = match req.method.as_str() {
                "initialize" => serde_json::json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "mock-backend", "version": "0.0.1"},
                }),
                "tools/list" => serde_json::json!({
                    "tools": [{"name": "echo", "inputSchema": {"type": "object"}}],
                }),
                "tools/call" => serde_json::json!({
                    "content": [{"type": "text", "text": "ok"}],
                    "isError": false,
                }),
                "ping" => serde_json::json!({}),
                other => {
                    let resp = JsonRpcResponse::failure(
                        id,
                        mcpgw_protocol::jsonrpc::JsonRpcError {
                            code: -32601,
                            message: format!("method not found: {other}"),
                            data: None,
                        },
                    );
                    self.outbound
                        .lock()
                        .await
                        .push(TransportMessage::new(serde_json::to_vec(&resp).unwrap()));
                    return Ok(());
                }
            };
            let resp = JsonRpcResponse::success(id, result);
            self.outbound
                .lock()
                .await
                .push(TransportMessage::new(serde_json::to_vec(&resp).unwrap()));
            Ok(())
        }

        async fn receive(&self) -> TransportResult<TransportMessage> {
            loop {
                if let Some(msg) = self.outbound.lock().await.pop() {
                    return Ok(msg);
                }
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        }

        async fn is_connected(&self) -> bool {
            self.connected.load(std::sync::atomic::Ordering::SeqCst)
        }

        fn session_id(&self) -> Option<&str> {
            None
        }

        fn metrics(&self) -> TransportMetrics {
            self.metrics.snapshot()
        }
    }

    #[tokio::test]
    async fn operations_before_initialize_fail() {
        let client = BackendClient::new(Arc::new(MockBackend::default()));
        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, ClientError::NotInitialized));
    }

    #[tokio::test]
    async fn initialize_then_list_and_call_tool_round_trip() {
        let client = BackendClient::new(Arc::new(MockBackend::default()));
        let init = client.initialize().await.unwrap();
        assert_eq!(init.server_info.name, "mock-backend");
        assert!(client.is_initialized().await);

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");

        let result = client.call_tool("echo", None).await.unwrap();
        assert!(!result.is_error);

        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn unmodeled_method_surfaces_as_rpc_error() {
        let client = BackendClient::new(Arc::new(MockBackend::default()));
        client.initialize().await.unwrap();
        let err = client.call_raw("completion/complete", None).await.unwrap_err();
        assert!(matches!(err, ClientError::Rpc(_)));
    }
}
