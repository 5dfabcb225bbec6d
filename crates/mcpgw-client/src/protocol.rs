//! Low-level JSON-RPC correlation layer, the missing piece between a raw
//! [`Transport`] and the typed operations in [`crate::BackendClient`].

use mcpgw_protocol::jsonrpc::{JsonRpcOutcome, JsonRpcRequest, JsonRpcResponse, MessageId};
use mcpgw_protocol::error::Error as ProtocolError;
use mcpgw_transport_traits::{Transport, TransportMessage};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, oneshot};

use crate::error::{ClientError, ClientResult};

/// Bounds the pending-reply table under a dispatch storm; a full table
/// signals backpressure to the caller rather than growing unbounded.
const MAX_PENDING: usize = 10_000;

/// Entries older than this are evicted even if never completed, as a
/// backstop against a waiter leaked by a cancelled `request` future (the
/// future is dropped mid-await, so no code runs to remove its entry).
const PENDING_TIMEOUT: Duration = Duration::from_secs(300);

struct PendingReply {
    sender: oneshot::Sender<JsonRpcResponse>,
    created_at: Instant,
}

/// Single-owner completion-sink table keyed by JSON-RPC id: each
/// outstanding `request` registers exactly one waiter for its id, and the
/// receive loop completes it exactly once (spec.md §5 "request/response
/// rendezvous uses a single-shot completion sink per outstanding id").
#[derive(Default)]
struct PendingReplies {
    entries: DashMap<MessageId, PendingReply>,
}

impl PendingReplies {
    fn evict_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| now.duration_since(e.created_at) < PENDING_TIMEOUT);
    }
}

/// Wraps a transport with request-id generation and id-correlated response
/// demuxing.
///
/// A single background task owns `Transport::receive` (the single-consumer
/// contract `mcpgw_transport_traits::Transport` documents) and dispatches
/// each inbound frame: a JSON-RPC response completes the waiter registered
/// for its id, if any, and anything else (a request/notification frame, or
/// a response whose id has no waiter) is published on the notification
/// side channel instead of being dropped silently. Multiple `request`
/// calls may therefore race concurrently over one transport; each gets the
/// reply that actually carries its id rather than whatever arrives next on
/// the wire.
pub struct ProtocolClient<T: Transport> {
    transport: Arc<T>,
    next_id: AtomicI64,
    pending: Arc<PendingReplies>,
    notifications: broadcast::Sender<serde_json::Value>,
    reader: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<T: Transport> fmt::Debug for ProtocolClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolClient").field("transport", &self.transport).finish_non_exhaustive()
    }
}

impl<T: Transport + 'static> ProtocolClient<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            next_id: AtomicI64::new(1),
            pending: Arc::new(PendingReplies::default()),
            notifications: broadcast::channel(256).0,
            reader: std::sync::Mutex::new(None),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Number of requests awaiting a correlated reply right now.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.entries.len()
    }

    /// Subscribes to frames the receive loop couldn't correlate to a
    /// waiting `request`: server-initiated notifications, and replies
    /// whose id no longer has a waiter (already timed out, or never ours).
    #[must_use]
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<serde_json::Value> {
        self.notifications.subscribe()
    }

    fn next_message_id(&self) -> MessageId {
        MessageId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Starts the single receive-loop task the first time it's needed.
    /// Idempotent: later calls see the task already running.
    fn ensure_reader(&self) {
        let mut guard = self.reader.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if guard.is_none() {
            let transport = self.transport.clone();
            let pending = self.pending.clone();
            let notifications = self.notifications.clone();
            *guard = Some(tokio::spawn(Self::read_loop(transport, pending, notifications)));
        }
    }

    /// The backend connection's sole reader: demuxes every inbound frame
    /// by id until the transport closes.
    async fn read_loop(transport: Arc<T>, pending: Arc<PendingReplies>, notifications: broadcast::Sender<serde_json::Value>) {
        loop {
            let raw = match transport.receive().await {
                Ok(raw) => raw,
                Err(_) => return,
            };
            match serde_json::from_slice::<JsonRpcResponse>(&raw.payload) {
                Ok(response) => {
                    if let Some((_, entry)) = pending.entries.remove(&response.id) {
                        let _ = entry.sender.send(response);
                    }
                    // Unmatched id: already timed out, or never ours.
                    // Dropped per spec.md §5 "a late reply is dropped".
                }
                Err(_) => {
                    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&raw.payload) {
                        let _ = notifications.send(value);
                    }
                }
            }
        }
    }

    /// Sends a JSON-RPC request and awaits its correlated response.
    pub async fn request<R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> ClientResult<R> {
        self.ensure_reader();
        self.pending.evict_expired();
        if self.pending.entries.len() >= MAX_PENDING {
            return Err(ClientError::Transport("pending-reply table at capacity".to_string()));
        }

        let id = self.next_message_id();
        let request = JsonRpcRequest::new(id.clone(), method, params);

        let (tx, rx) = oneshot::channel();
        self.pending.entries.insert(id.clone(), PendingReply { sender: tx, created_at: Instant::now() });

        let payload = serde_json::to_vec(&request).map_err(|e| ClientError::Encode(e.to_string()))?;
        if let Err(e) = self.transport.send(TransportMessage::new(payload)).await {
            self.pending.entries.remove(&id);
            return Err(ClientError::Transport(e.to_string()));
        }

        let response = match rx.await {
            Ok(response) => response,
            Err(_) => {
                self.pending.entries.remove(&id);
                return Err(ClientError::Transport("connection closed while awaiting reply".to_string()));
            }
        };

        match response.outcome {
            JsonRpcOutcome::Error { error } => Err(ClientError::Rpc(ProtocolError::new(
                error_kind_from_code(error.code),
                error.message,
            ))),
            JsonRpcOutcome::Result { result } => serde_json::from_value(result)
                .map_err(|e| ClientError::Decode(e.to_string())),
        }
    }

    /// Sends a JSON-RPC notification; no response is awaited.
    pub async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> ClientResult<()> {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        let payload = serde_json::to_vec(&notification)
            .map_err(|e| ClientError::Encode(e.to_string()))?;
        self.transport
            .send(TransportMessage::new(payload))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}

fn error_kind_from_code(code: i64) -> mcpgw_protocol::error::ErrorKind {
    use mcpgw_protocol::error::ErrorKind;
    match code {
        -32700 => ErrorKind::Parse,
        -32600 => ErrorKind::InvalidRequest,
        -32601 => ErrorKind::MethodNotFound,
        -32602 => ErrorKind::InvalidParams,
        -32603 => ErrorKind::Internal,
        _ => ErrorKind::ServerError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcpgw_transport_traits::{AtomicMetrics, TransportError, TransportMetrics, TransportResult, TransportType};
    use tokio::sync::Mutex as TokioMutex;

    /// A transport stand-in whose `receive` answers out of order and with
    /// an interleaved notification, so a blind "next frame off the wire is
    /// my reply" implementation would mismatch responses to requests.
    #[derive(Debug, Default)]
    struct ShuffledBackend {
        inbound: TokioMutex<Vec<serde_json::Value>>,
        connected: std::sync::atomic::AtomicBool,
        metrics: AtomicMetrics,
    }

    #[async_trait]
    impl Transport for ShuffledBackend {
        fn transport_type(&self) -> TransportType {
            TransportType::Stdio
        }
        async fn connect(&self) -> TransportResult<()> {
            self.connected.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
        async fn disconnect(&self) -> TransportResult<()> {
            Ok(())
        }
        async fn send(&self, message: TransportMessage) -> TransportResult<()> {
            let req: JsonRpcRequest = serde_json::from_slice(&message.payload)
                .map_err(|e| TransportError::Decode(e.to_string()))?;
            let Some(id) = req.id else { return Ok(()) };
            // Reply to id 2 before id 1, with a stray notification in
            // between, to exercise real id-based correlation.
            let mut queue = self.inbound.lock().await;
            if let MessageId::Number(2) = id {
                queue.push(serde_json::json!({"jsonrpc": "2.0", "method": "notifications/progress"}));
                queue.push(serde_json::to_value(JsonRpcResponse::success(id, serde_json::json!({"tag": "two"}))).unwrap());
            } else {
                queue.push(serde_json::to_value(JsonRpcResponse::success(id, serde_json::json!({"tag": "one"}))).unwrap());
            }
            Ok(())
        }
        async fn receive(&self) -> TransportResult<TransportMessage> {
            loop {
                if let Some(value) = self.inbound.lock().await.pop() {
                    return Ok(TransportMessage::new(serde_json::to_vec(&value).unwrap()));
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
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

    #[derive(serde::Deserialize, Debug, PartialEq, Eq)]
    struct Tagged {
        tag: String,
    }

    #[tokio::test]
    async fn concurrent_requests_are_matched_by_id_not_arrival_order() {
        let client = ProtocolClient::new(Arc::new(ShuffledBackend::default()));
        let (r1, r2) = tokio::join!(
            client.request::<Tagged>("m1", None),
            client.request::<Tagged>("m2", None),
        );
        assert_eq!(r1.unwrap().tag, "one");
        assert_eq!(r2.unwrap().tag, "two");
    }

    #[tokio::test]
    async fn unmatched_notification_is_published_on_the_side_channel() {
        let client = ProtocolClient::new(Arc::new(ShuffledBackend::default()));
        let mut notifications = client.subscribe_notifications();
        let _ = client.request::<Tagged>("m2", None).await;
        let note = notifications.recv().await.unwrap();
        assert_eq!(note["method"], "notifications/progress");
    }
}
