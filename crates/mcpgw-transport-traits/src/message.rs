//! The framed unit every transport adapter sends/receives.

use bytes::Bytes;

/// A single framed JSON-RPC message, already delimited by the adapter
/// (newline, length-prefix, WS frame boundary, SSE event, ...). The
/// payload is kept as raw bytes here; `mcpgw-client`/`mcpgw-proxy` parse
/// it into the typed JSON-RPC envelope from `mcpgw-protocol`.
#[derive(Debug, Clone)]
pub struct TransportMessage {
    /// Raw JSON payload, UTF-8 encoded.
    pub payload: Bytes,
}

impl TransportMessage {
    /// Wrap a JSON payload.
    #[must_use]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Borrow the payload as `&str`, if it is valid UTF-8.
    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.payload)
    }
}

impl From<serde_json::Value> for TransportMessage {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value.to_string().into_bytes())
    }
}
