//! Gateway error hierarchy (spec.md §7).
//!
//! Mirrors the 3-tier split the rest of the workspace uses: protocol
//! errors from `mcpgw-protocol` are preserved verbatim so their JSON-RPC
//! code survives the round trip, transport errors are wrapped, and
//! everything proxy-specific (routing, rate limiting, filters, config)
//! gets its own variant with a `sanitize()`-safe client-facing message.

use mcpgw_client::ClientError;
use mcpgw_transport_traits::TransportError;
use thiserror::Error;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// Preserves the protocol error (and its JSON-RPC code) from
    /// `mcpgw-protocol`.
    #[error("protocol error: {0}")]
    Protocol(#[from] Box<mcpgw_protocol::error::Error>),

    /// Wraps a transport-layer failure from `mcpgw-transport-traits`.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A backend client call failed (encode/decode/rpc failure surfaced
    /// from `mcpgw-client`).
    #[error("backend client error: {0}")]
    Client(#[from] ClientError),

    /// No namespace/backend matches the requested method (spec.md §3
    /// "unknown methods yield -32601").
    #[error("routing error: {message}")]
    Routing { message: String },

    /// A prefixed tool name didn't parse (spec.md §3 "bad prefixes yield
    /// -32602"), distinct from `Routing` so the JSON-RPC code differs.
    #[error("invalid tool name: {message}")]
    InvalidToolName { message: String },

    /// Malformed gateway configuration.
    #[error("configuration error: {message}")]
    Configuration { message: String, key: Option<String> },

    /// The circuit breaker for a backend is open.
    #[error("circuit open for backend {backend}")]
    CircuitOpen { backend: String },

    /// No healthy backend available in the namespace.
    #[error("no healthy backend in namespace {namespace}")]
    NoHealthyBackend { namespace: String },

    /// A rate limit policy rejected the request.
    #[error("rate limit exceeded: {message}")]
    RateLimitExceeded {
        message: String,
        retry_after_ms: Option<u64>,
    },

    /// A filter in the chain blocked the request or response.
    #[error("blocked by filter {filter}: {reason}")]
    FilteredOut { filter: String, reason: String },

    /// A virtual-server adapter's outbound HTTP call returned >= 400
    /// (spec.md §4.9 step 4).
    #[error("upstream HTTP {status}: {body_summary}")]
    UpstreamHttp { status: u16, body_summary: String },

    /// Operation exceeded its configured deadline.
    #[error("timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn routing(message: impl Into<String>) -> Self {
        Self::Routing { message: message.into() }
    }

    pub fn invalid_tool_name(message: impl Into<String>) -> Self {
        Self::InvalidToolName { message: message.into() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into(), key: None }
    }

    pub fn configuration_with_key(message: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Configuration { message: message.into(), key: Some(key.into()) }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout { operation: operation.into(), timeout_ms }
    }

    pub fn rate_limit_exceeded(message: impl Into<String>, retry_after_ms: Option<u64>) -> Self {
        Self::RateLimitExceeded { message: message.into(), retry_after_ms }
    }

    pub fn upstream_http(status: u16, body_summary: impl Into<String>) -> Self {
        Self::UpstreamHttp { status, body_summary: body_summary.into() }
    }

    /// Client-facing message with internal detail stripped (spec.md §7
    /// "internal errors never leak backend detail to clients").
    #[must_use]
    pub fn sanitize(&self) -> String {
        match self {
            Self::Protocol(_) => "protocol error occurred".to_string(),
            Self::Transport(_) => "transport error occurred".to_string(),
            Self::Client(_) => "backend communication failed".to_string(),
            Self::Routing { .. } => "no route for this request".to_string(),
            Self::InvalidToolName { .. } => "Invalid tool name format".to_string(),
            Self::Configuration { .. } => "gateway configuration error".to_string(),
            Self::CircuitOpen { backend } => format!("backend {backend} is temporarily unavailable"),
            Self::NoHealthyBackend { namespace } => {
                format!("no healthy backend available for {namespace}")
            }
            Self::RateLimitExceeded { .. } => "rate limit exceeded".to_string(),
            Self::FilteredOut { .. } => "request blocked by policy".to_string(),
            Self::UpstreamHttp { status, .. } => format!("upstream request failed with status {status}"),
            Self::Timeout { operation, .. } => format!("{operation} timed out"),
            Self::Serialization(_) => "malformed payload".to_string(),
            Self::Io(_) => "io error occurred".to_string(),
        }
    }

    /// `true` when retrying the same request (possibly against a
    /// different backend) is reasonable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Client(_)
                | Self::CircuitOpen { .. }
                | Self::NoHealthyBackend { .. }
                | Self::Timeout { .. }
        )
    }

    /// Maps this error onto the JSON-RPC error kind/sub_kind pair used on
    /// the wire (spec.md §7 table).
    #[must_use]
    pub fn to_protocol_error(&self) -> mcpgw_protocol::error::Error {
        use mcpgw_protocol::error::Error as ProtocolError;
        match self {
            Self::Protocol(inner) => (**inner).clone(),
            Self::Routing { message } => ProtocolError::method_not_found(message.clone()),
            Self::InvalidToolName { .. } => ProtocolError::invalid_params(self.sanitize()),
            Self::Configuration { .. } => ProtocolError::internal(self.sanitize()),
            Self::CircuitOpen { .. } => {
                ProtocolError::server_error(self.sanitize(), "circuit_open")
            }
            Self::NoHealthyBackend { .. } => {
                ProtocolError::server_error(self.sanitize(), "no_healthy_backend")
            }
            Self::RateLimitExceeded { .. } => {
                ProtocolError::server_error(self.sanitize(), "rate_limited")
            }
            Self::FilteredOut { .. } => ProtocolError::invalid_request(self.sanitize()),
            Self::UpstreamHttp { status, body_summary } => ProtocolError::internal(format!(
                "{}: status {status}, {body_summary}",
                self.sanitize()
            )),
            Self::Timeout { .. } => ProtocolError::timeout(self.sanitize()),
            Self::Transport(_) | Self::Client(_) | Self::Serialization(_) | Self::Io(_) => {
                ProtocolError::internal(self.sanitize())
            }
        }
    }
}

impl From<mcpgw_protocol::error::Error> for GatewayError {
    fn from(err: mcpgw_protocol::error::Error) -> Self {
        Self::Protocol(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_never_echoes_backend_detail() {
        let err = GatewayError::CircuitOpen { backend: "payments-backend".to_string() };
        assert!(err.sanitize().contains("payments-backend"));
        // backend *name* is allowed through (it's routing metadata, not a
        // stack trace); internal causes like `Transport`/`Client` are the
        // ones that must not leak detail.
        let err = GatewayError::Client(ClientError::Decode("unexpected eof at byte 412".into()));
        assert_eq!(err.sanitize(), "backend communication failed");
    }

    #[test]
    fn retryable_classification_matches_spec_table() {
        assert!(GatewayError::NoHealthyBackend { namespace: "ns".into() }.is_retryable());
        assert!(!GatewayError::Routing { message: "bad".into() }.is_retryable());
    }

    #[test]
    fn upstream_http_error_maps_to_internal_code() {
        let err = GatewayError::upstream_http(503, "service unavailable");
        let protocol_err = err.to_protocol_error();
        assert_eq!(protocol_err.kind, mcpgw_protocol::error::ErrorKind::Internal);
        assert!(protocol_err.message.contains("503"));
    }

    #[test]
    fn circuit_open_maps_to_server_error_with_sub_kind() {
        let err = GatewayError::CircuitOpen { backend: "b1".into() };
        let protocol_err = err.to_protocol_error();
        assert_eq!(protocol_err.sub_kind.as_deref(), Some("circuit_open"));
    }
}
