//! HTTP request/response transport (spec.md §4.1 "HTTP (request/response)").
//!
//! Used for backend connections to HTTP-only MCP servers: every outbound
//! message is one POST, and its response is queued for the next `receive`.
//! There is no long-lived stream and no server push — keepalives are
//! whatever the underlying `reqwest::Client` does.
//!
//! The gateway's own client-facing `POST /mcp/rpc` endpoint (spec.md §6) is
//! handled directly by the axum router in `mcpgw-proxy`, not through this
//! adapter: a stateless request/response RPC has no session-shaped
//! `Transport` to hold, since there is nothing to keep connected between
//! calls.

use async_trait::async_trait;
use mcpgw_transport_traits::{
    AtomicMetrics, Transport, TransportError, TransportMessage, TransportMetrics, TransportResult,
    TransportType,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Inner {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
    pending: Mutex<Vec<TransportMessage>>,
    connected: std::sync::atomic::AtomicBool,
    metrics: AtomicMetrics,
}

/// One HTTP backend connection, addressed by base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    inner: Arc<Inner>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                base_url: base_url.into(),
                auth_token,
                client: reqwest::Client::new(),
                pending: Mutex::new(Vec::new()),
                connected: std::sync::atomic::AtomicBool::new(false),
                metrics: AtomicMetrics::default(),
            }),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Http
    }

    async fn connect(&self) -> TransportResult<()> {
        self.inner.metrics.record_connect_attempt();
        self.inner
            .connected
            .store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.inner
            .connected
            .store(false, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        if !self.inner.connected.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.inner.metrics.record_send(message.payload.len());

        let mut req = self
            .inner
            .client
            .post(&self.inner.base_url)
            .header("content-type", "application/json")
            .body(message.payload.to_vec());
        if let Some(token) = &self.inner.auth_token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::BrokenPipe(e.to_string()))?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        self.inner.metrics.record_receive(bytes.len());
        self.inner
            .pending
            .lock()
            .await
            .push(TransportMessage::new(bytes.to_vec()));
        Ok(())
    }

    async fn receive(&self) -> TransportResult<TransportMessage> {
        timeout(RECEIVE_TIMEOUT, async {
            loop {
                if let Some(msg) = self.inner.pending.lock().await.pop() {
                    return msg;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .map_err(|_| TransportError::Timeout(RECEIVE_TIMEOUT))
    }

    async fn is_connected(&self) -> bool {
        self.inner.connected.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn session_id(&self) -> Option<&str> {
        None
    }

    fn metrics(&self) -> TransportMetrics {
        self.inner.metrics.snapshot()
    }
}
