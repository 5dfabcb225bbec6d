//! SSE transport (spec.md §4.1 "SSE").
//!
//! The server pushes MCP messages to the client as `data:` events over a
//! long-lived GET; messages flowing the other way arrive on a companion
//! POST channel keyed by session id. A periodic keepalive comment frame
//! (`: keepalive`) keeps intermediaries from closing the stream.
//!
//! This adapter models the gateway's view of an SSE *backend*: `send`
//! posts to the backend's message endpoint, `receive` pulls the next
//! `data:` event off the stream reader task.

use async_trait::async_trait;
use futures::StreamExt;
use mcpgw_transport_traits::{
    AtomicMetrics, Transport, TransportError, TransportMessage, TransportMetrics, TransportResult,
    TransportType,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;
use tracing::debug;

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug)]
struct Inner {
    stream_url: String,
    post_url: Mutex<Option<String>>,
    session_id: Mutex<Option<String>>,
    client: reqwest::Client,
    inbound: Mutex<VecDeque<TransportMessage>>,
    inbound_notify: Notify,
    connected: std::sync::atomic::AtomicBool,
    metrics: AtomicMetrics,
}

/// SSE transport: GET event stream in, POST messages out.
#[derive(Debug, Clone)]
pub struct SseTransport {
    inner: Arc<Inner>,
}

impl SseTransport {
    #[must_use]
    pub fn new(stream_url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                stream_url: stream_url.into(),
                post_url: Mutex::new(None),
                session_id: Mutex::new(None),
                client: reqwest::Client::new(),
                inbound: Mutex::new(VecDeque::new()),
                inbound_notify: Notify::new(),
                connected: std::sync::atomic::AtomicBool::new(false),
                metrics: AtomicMetrics::default(),
            }),
        }
    }

    /// Parses one SSE event block, extracting `event:`, `data:` lines and
    /// the server-announced POST endpoint sent as an `endpoint` event.
    fn parse_event(block: &str) -> (Option<String>, String) {
        let mut event_name = None;
        let mut data = String::new();
        for line in block.lines() {
            if let Some(rest) = line.strip_prefix("event:") {
                event_name = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("data:") {
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(rest.trim());
            }
        }
        (event_name, data)
    }
}

#[async_trait]
impl Transport for SseTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Sse
    }

    async fn connect(&self) -> TransportResult<()> {
        self.inner.metrics.record_connect_attempt();
        let resp = self
            .inner
            .client
            .get(&self.inner.stream_url)
            .header("accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| {
                self.inner.metrics.record_connect_failure();
                TransportError::ConnectFailed(e.to_string())
            })?;

        if let Some(sid) = resp.headers().get("mcp-session-id") {
            if let Ok(sid) = sid.to_str() {
                *self.inner.session_id.lock().await = Some(sid.to_string());
            }
        }

        let mut byte_stream = resp.bytes_stream();
        let this = self.clone();
        tokio::spawn(async move {
            let mut buf = String::new();
            while let Some(chunk) = byte_stream.next().await {
                let Ok(chunk) = chunk else {
                    debug!("sse stream ended");
                    break;
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buf.find("\n\n") {
                    let block = buf[..pos].to_string();
                    buf.drain(..pos + 2);
                    if block.trim_start().starts_with(':') {
                        continue; // keepalive comment frame
                    }
                    let (event_name, data) = Self::parse_event(&block);
                    if event_name.as_deref() == Some("endpoint") {
                        *this.inner.post_url.lock().await = Some(data);
                        continue;
                    }
                    if data.is_empty() {
                        continue;
                    }
                    this.inner.metrics.record_receive(data.len());
                    let mut q = this.inner.inbound.lock().await;
                    q.push_back(TransportMessage::new(data.into_bytes()));
                    drop(q);
                    this.inner.inbound_notify.notify_one();
                }
            }
            this.inner
                .connected
                .store(false, std::sync::atomic::Ordering::SeqCst);
        });

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
        let post_url = self.inner.post_url.lock().await.clone();
        let url = post_url.unwrap_or_else(|| self.inner.stream_url.clone());
        self.inner.metrics.record_send(message.payload.len());

        let mut req = self
            .inner
            .client
            .post(&url)
            .header("content-type", "application/json")
            .body(message.payload.to_vec());
        if let Some(sid) = self.inner.session_id.lock().await.clone() {
            req = req.header("mcp-session-id", sid);
        }
        req.send()
            .await
            .map_err(|e| TransportError::BrokenPipe(e.to_string()))?;
        Ok(())
    }

    async fn receive(&self) -> TransportResult<TransportMessage> {
        timeout(RECEIVE_TIMEOUT, async {
            loop {
                if let Some(msg) = self.inner.inbound.lock().await.pop_front() {
                    return msg;
                }
                self.inner.inbound_notify.notified().await;
            }
        })
        .await
        .map_err(|_| TransportError::Timeout(RECEIVE_TIMEOUT))
    }

    async fn is_connected(&self) -> bool {
        self.inner
            .connected
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    fn session_id(&self) -> Option<&str> {
        None
    }

    fn metrics(&self) -> TransportMetrics {
        self.inner.metrics.snapshot()
    }
}

// Documents the server-side keepalive cadence this adapter expects from a
// well-behaved backend; the gateway's own SSE frontend (axum) emits these
// at the same interval.
#[allow(dead_code)]
const _: Duration = KEEPALIVE_INTERVAL;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_and_endpoint_events() {
        let (name, data) = SseTransport::parse_event("event: endpoint\ndata: /messages?sid=1");
        assert_eq!(name.as_deref(), Some("endpoint"));
        assert_eq!(data, "/messages?sid=1");

        let (name, data) = SseTransport::parse_event("data: {\"jsonrpc\":\"2.0\"}");
        assert_eq!(name, None);
        assert_eq!(data, "{\"jsonrpc\":\"2.0\"}");
    }

    #[test]
    fn multiline_data_is_joined_with_newline() {
        let (_, data) = SseTransport::parse_event("data: line1\ndata: line2");
        assert_eq!(data, "line1\nline2");
    }
}
