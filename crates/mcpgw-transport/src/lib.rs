//! Concrete transport adapters implementing
//! [`mcpgw_transport_traits::Transport`] (spec.md §4.1).
//!
//! Each adapter owns its own framing and keepalive rules but exposes the
//! same `Connect/Disconnect/Send/Receive` surface, so the session layer and
//! backend pool in `mcpgw-proxy` never need to know which one they're
//! talking to.

pub mod http;
pub mod sse;
pub mod stdio;
pub mod streamable;
pub mod websocket;

pub use mcpgw_transport_traits::{
    AtomicMetrics, Transport, TransportError, TransportMessage, TransportMetrics,
    TransportResult, TransportType,
};

pub use http::HttpTransport;
pub use sse::SseTransport;
pub use stdio::{ChildProcessSpec, StdioTransport};
pub use streamable::StreamableHttpTransport;
pub use websocket::WebSocketTransport;
