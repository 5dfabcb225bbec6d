//! WebSocket transport (spec.md §4.1 "WebSocket").
//!
//! Full-duplex JSON frames over one socket. The adapter pings the peer
//! every `websocket_timeout / 2` and closes the connection after two
//! consecutive missed pongs.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use mcpgw_transport_traits::{
    AtomicMetrics, Transport, TransportError, TransportMessage, TransportMetrics, TransportResult,
    TransportType,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_MISSED_PONGS: u32 = 2;

#[derive(Debug)]
struct Inner {
    url: String,
    websocket_timeout: Duration,
    outbound_tx: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    inbound: Mutex<VecDeque<TransportMessage>>,
    inbound_notify: Notify,
    missed_pongs: AtomicU32,
    connected: std::sync::atomic::AtomicBool,
    metrics: AtomicMetrics,
}

/// WebSocket transport: ping/pong keepalive, one frame per JSON-RPC
/// message.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    inner: Arc<Inner>,
}

impl WebSocketTransport {
    #[must_use]
    pub fn new(url: impl Into<String>, websocket_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                websocket_timeout,
                outbound_tx: Mutex::new(None),
                inbound: Mutex::new(VecDeque::new()),
                inbound_notify: Notify::new(),
                missed_pongs: AtomicU32::new(0),
                connected: std::sync::atomic::AtomicBool::new(false),
                metrics: AtomicMetrics::default(),
            }),
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::WebSocket
    }

    async fn connect(&self) -> TransportResult<()> {
        self.inner.metrics.record_connect_attempt();
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.inner.url)
            .await
            .map_err(|e| {
                self.inner.metrics.record_connect_failure();
                TransportError::ConnectFailed(e.to_string())
            })?;
        let (mut write, mut read) = ws_stream.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let this = self.clone();
        let ping_tx = tx.clone();
        let ping_interval = self.inner.websocket_timeout / 2;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ping_interval);
            loop {
                ticker.tick().await;
                if !this
                    .inner
                    .connected
                    .load(std::sync::atomic::Ordering::SeqCst)
                {
                    break;
                }
                if this.inner.missed_pongs.load(Ordering::SeqCst) >= MAX_MISSED_PONGS {
                    warn!("websocket missed {MAX_MISSED_PONGS} pongs, closing");
                    this.inner
                        .connected
                        .store(false, std::sync::atomic::Ordering::SeqCst);
                    break;
                }
                this.inner.missed_pongs.fetch_add(1, Ordering::SeqCst);
                if ping_tx.send(WsMessage::Ping(Vec::new().into())).is_err() {
                    break;
                }
            }
        });

        let this = self.clone();
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        this.inner.metrics.record_receive(text.len());
                        let mut q = this.inner.inbound.lock().await;
                        q.push_back(TransportMessage::new(text.as_bytes().to_vec()));
                        drop(q);
                        this.inner.inbound_notify.notify_one();
                    }
                    Ok(WsMessage::Binary(bytes)) => {
                        this.inner.metrics.record_receive(bytes.len());
                        let mut q = this.inner.inbound.lock().await;
                        q.push_back(TransportMessage::new(bytes.to_vec()));
                        drop(q);
                        this.inner.inbound_notify.notify_one();
                    }
                    Ok(WsMessage::Pong(_)) => {
                        this.inner.missed_pongs.store(0, Ordering::SeqCst);
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!(error = %e, "websocket read error");
                        break;
                    }
                }
            }
            this.inner
                .connected
                .store(false, std::sync::atomic::Ordering::SeqCst);
        });

        *self.inner.outbound_tx.lock().await = Some(tx);
        self.inner
            .connected
            .store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.inner
            .connected
            .store(false, std::sync::atomic::Ordering::SeqCst);
        if let Some(tx) = self.inner.outbound_tx.lock().await.take() {
            let _ = tx.send(WsMessage::Close(None));
        }
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        let tx = self.inner.outbound_tx.lock().await.clone();
        let Some(tx) = tx else {
            return Err(TransportError::NotConnected);
        };
        self.inner.metrics.record_send(message.payload.len());
        let text = message
            .as_str()
            .map_err(|e| TransportError::Decode(e.to_string()))?
            .to_string();
        tx.send(WsMessage::Text(text.into()))
            .map_err(|_| TransportError::BrokenPipe("websocket closed".into()))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_interval_is_half_the_configured_timeout() {
        let t = WebSocketTransport::new("ws://localhost", Duration::from_secs(30));
        assert_eq!(t.inner.websocket_timeout / 2, Duration::from_secs(15));
    }
}
