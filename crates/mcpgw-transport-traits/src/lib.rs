//! Core transport capability set (spec.md §4.1, §9 "Polymorphic transports
//! and adapters").
//!
//! Every frontend (stdio/HTTP/SSE/WebSocket/streamable) and, symmetrically,
//! the backend client connection in `mcpgw-client`, implements [`Transport`].
//! The rest of the gateway never matches on concrete transport types; it
//! only ever holds a `Box<dyn Transport>` (or an `Arc<dyn Transport>` when
//! shared), tagged with a [`TransportType`] for the registry in §9.

mod error;
mod message;
mod metrics;

pub use error::{TransportError, TransportResult};
pub use message::TransportMessage;
pub use metrics::{AtomicMetrics, TransportMetrics};

use async_trait::async_trait;
use std::fmt;

/// Tag identifying which concrete adapter backs a `dyn Transport`, used by
/// the process-global transport registry (spec.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    Stdio,
    Http,
    Sse,
    WebSocket,
    StreamableHttp,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
            Self::Sse => "sse",
            Self::WebSocket => "websocket",
            Self::StreamableHttp => "streamable_http",
        };
        write!(f, "{s}")
    }
}

/// The capability set every transport adapter exposes to the rest of the
/// core (spec.md §4.1): `Connect`, `Disconnect`, `Send`, `Receive`,
/// `IsConnected`, `SessionID`.
///
/// `Send` may be called from multiple producers and implementations must
/// serialize writes internally; `Receive` is called by at most one
/// consumer. Both are cancellation-safe: dropping the future aborts the
/// operation without leaking tasks (spec.md §4.1 "Cancellation").
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Which concrete adapter this is.
    fn transport_type(&self) -> TransportType;

    /// Open the underlying connection (spawn the child process, accept the
    /// upgrade, dial the socket, ...).
    async fn connect(&self) -> TransportResult<()>;

    /// Tear the connection down. Idempotent: calling it twice is not an
    /// error.
    async fn disconnect(&self) -> TransportResult<()>;

    /// Send one message. Calls from independent producers must appear to
    /// execute in some serial order; the order callers observe execution in
    /// is each sender's own call order (spec.md §4.1 "Ordering").
    async fn send(&self, message: TransportMessage) -> TransportResult<()>;

    /// Block until the next inbound message, or an error/timeout occurs.
    async fn receive(&self) -> TransportResult<TransportMessage>;

    /// Non-blocking connectivity check.
    async fn is_connected(&self) -> bool;

    /// Stable identifier for the client session this transport instance
    /// belongs to, if one has been assigned.
    fn session_id(&self) -> Option<&str>;

    /// Point-in-time metrics snapshot for this transport instance.
    fn metrics(&self) -> TransportMetrics;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    fn transport_type(&self) -> TransportType {
        (**self).transport_type()
    }
    async fn connect(&self) -> TransportResult<()> {
        (**self).connect().await
    }
    async fn disconnect(&self) -> TransportResult<()> {
        (**self).disconnect().await
    }
    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        (**self).send(message).await
    }
    async fn receive(&self) -> TransportResult<TransportMessage> {
        (**self).receive().await
    }
    async fn is_connected(&self) -> bool {
        (**self).is_connected().await
    }
    fn session_id(&self) -> Option<&str> {
        (**self).session_id()
    }
    fn metrics(&self) -> TransportMetrics {
        (**self).metrics()
    }
}

/// Factory registered per [`TransportType`] in the process-global registry
/// (spec.md §9): "registration open at startup, read-mostly thereafter".
pub trait TransportFactory: Send + Sync {
    /// Build a boxed transport instance from adapter-specific config,
    /// already deserialized by the caller.
    fn create(&self, config: serde_json::Value) -> TransportResult<Box<dyn Transport>>;
}
