//! Streamable HTTP transport (spec.md §4.1 "Streamable HTTP").
//!
//! Chunked request and response bodies carry JSON-RPC frames delimited by
//! a 4-byte big-endian length prefix (the Open Question on framing was
//! resolved in favor of length-prefixed JSON — see DESIGN.md — since a
//! bare newline delimiter breaks on any backend that pretty-prints its
//! JSON). Optional "stateful" mode pins a session id in the
//! `mcp-session-id` header so the backend can resume across reconnects.

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
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
const LENGTH_PREFIX_BYTES: usize = 4;

fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(LENGTH_PREFIX_BYTES + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Pulls complete length-prefixed frames out of `buf`, leaving any partial
/// tail in place for the next chunk.
fn drain_frames(buf: &mut BytesMut) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    loop {
        if buf.len() < LENGTH_PREFIX_BYTES {
            break;
        }
        let len = u32::from_be_bytes(buf[..LENGTH_PREFIX_BYTES].try_into().unwrap()) as usize;
        if buf.len() < LENGTH_PREFIX_BYTES + len {
            break;
        }
        buf.advance(LENGTH_PREFIX_BYTES);
        let frame = buf.split_to(len);
        frames.push(frame.to_vec());
    }
    frames
}

#[derive(Debug)]
struct Inner {
    url: String,
    stateful: bool,
    session_id: Mutex<Option<String>>,
    client: reqwest::Client,
    inbound: Mutex<VecDeque<TransportMessage>>,
    inbound_notify: Notify,
    connected: std::sync::atomic::AtomicBool,
    metrics: AtomicMetrics,
}

/// Streamable HTTP transport with length-prefixed JSON-RPC framing.
#[derive(Debug, Clone)]
pub struct StreamableHttpTransport {
    inner: Arc<Inner>,
}

impl StreamableHttpTransport {
    #[must_use]
    pub fn new(url: impl Into<String>, stateful: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                stateful,
                session_id: Mutex::new(None),
                client: reqwest::Client::new(),
                inbound: Mutex::new(VecDeque::new()),
                inbound_notify: Notify::new(),
                connected: std::sync::atomic::AtomicBool::new(false),
                metrics: AtomicMetrics::default(),
            }),
        }
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::StreamableHttp
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
        if self.inner.stateful {
            *self.inner.session_id.lock().await = None;
        }
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        if !self
            .inner
            .connected
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Err(TransportError::NotConnected);
        }
        self.inner.metrics.record_send(message.payload.len());

        let frame = encode_frame(&message.payload);
        let mut req = self
            .inner
            .client
            .post(&self.inner.url)
            .header("content-type", "application/vnd.mcpgw.streamable+octet-stream")
            .body(frame);
        if self.inner.stateful {
            if let Some(sid) = self.inner.session_id.lock().await.clone() {
                req = req.header("mcp-session-id", sid);
            }
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::BrokenPipe(e.to_string()))?;

        if self.inner.stateful {
            if let Some(sid) = resp.headers().get("mcp-session-id") {
                if let Ok(sid) = sid.to_str() {
                    *self.inner.session_id.lock().await = Some(sid.to_string());
                }
            }
        }

        let mut byte_stream = resp.bytes_stream();
        let this = self.clone();
        tokio::spawn(async move {
            let mut buf = BytesMut::new();
            while let Some(chunk) = byte_stream.next().await {
                let Ok(chunk) = chunk else {
                    debug!("streamable response ended");
                    break;
                };
                buf.extend_from_slice(&chunk);
                for frame in drain_frames(&mut buf) {
                    this.inner.metrics.record_receive(frame.len());
                    let mut q = this.inner.inbound.lock().await;
                    q.push_back(TransportMessage::new(frame));
                    drop(q);
                    this.inner.inbound_notify.notify_one();
                }
            }
        });

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_drain_recovers_the_payload() {
        let frame = encode_frame(b"{\"jsonrpc\":\"2.0\"}");
        let mut buf = BytesMut::from(&frame[..]);
        let frames = drain_frames(&mut buf);
        assert_eq!(frames, vec![b"{\"jsonrpc\":\"2.0\"}".to_vec()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_is_left_for_the_next_chunk() {
        let frame = encode_frame(b"hello");
        let mut buf = BytesMut::from(&frame[..frame.len() - 2]);
        let frames = drain_frames(&mut buf);
        assert!(frames.is_empty());
        assert_eq!(buf.len(), frame.len() - 2);
    }

    #[test]
    fn two_frames_back_to_back_both_drain() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_frame(b"one"));
        buf.extend_from_slice(&encode_frame(b"two"));
        let frames = drain_frames(&mut buf);
        assert_eq!(frames, vec![b"one".to_vec(), b"two".to_vec()]);
    }
}
