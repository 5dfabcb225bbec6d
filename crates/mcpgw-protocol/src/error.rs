//! Error kind + JSON-RPC code mapping (spec.md §6/§7).

use serde::{Deserialize, Serialize};

/// Result type alias used across protocol-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a protocol-level failure, independent of where in the
/// gateway it originated. Each variant maps to exactly one JSON-RPC error
/// code via [`ErrorKind::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed JSON on the wire.
    Parse,
    /// Well-formed JSON that isn't a valid JSON-RPC envelope.
    InvalidRequest,
    /// No handler registered for the method.
    MethodNotFound,
    /// Params present but invalid for the method (includes bad tool-name
    /// prefixes, per spec.md §4.3).
    InvalidParams,
    /// Unhandled failure while processing an otherwise valid request.
    Internal,
    /// Catch-all server/runtime error; the specific sub-kind lives in
    /// `data.kind` on the wire (`timeout`, `circuit_open`,
    /// `no_healthy_backend`, ...), per spec.md §7.
    ServerError,
}

impl ErrorKind {
    /// JSON-RPC numeric code for this error kind (spec.md §6 table).
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Parse => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::Internal => -32603,
            Self::ServerError => -32000,
        }
    }
}

/// A protocol-level error with enough context to render a JSON-RPC error
/// object without leaking internals (spec.md §7 `internal` kind).
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct Error {
    /// Classification used to pick the JSON-RPC code.
    pub kind: ErrorKind,
    /// Human-readable message, safe to send to clients.
    pub message: String,
    /// Optional sub-kind surfaced in the JSON-RPC `data.kind` field
    /// (e.g. `"timeout"`, `"circuit_open"`).
    pub sub_kind: Option<String>,
}

impl Error {
    /// Build an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sub_kind: None,
        }
    }

    /// Attach a `data.kind` sub-classification (spec.md §7).
    #[must_use]
    pub fn with_sub_kind(mut self, sub_kind: impl Into<String>) -> Self {
        self.sub_kind = Some(sub_kind.into());
        self
    }

    /// Shorthand constructors matching the spec.md §7 error kinds.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MethodNotFound, message)
    }
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
    pub fn server_error(message: impl Into<String>, sub_kind: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerError, message).with_sub_kind(sub_kind)
    }
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::server_error(format!("{} timed out", operation.into()), "timeout")
    }

    /// Render as the `JsonRpcError` object placed on the wire.
    #[must_use]
    pub fn to_jsonrpc(&self) -> crate::jsonrpc::JsonRpcError {
        let data = self
            .sub_kind
            .as_ref()
            .map(|k| serde_json::json!({ "kind": k }));
        crate::jsonrpc::JsonRpcError {
            code: self.kind.code(),
            message: self.message.clone(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_match_spec_table() {
        assert_eq!(ErrorKind::Parse.code(), -32700);
        assert_eq!(ErrorKind::InvalidRequest.code(), -32600);
        assert_eq!(ErrorKind::MethodNotFound.code(), -32601);
        assert_eq!(ErrorKind::InvalidParams.code(), -32602);
        assert_eq!(ErrorKind::Internal.code(), -32603);
        assert_eq!(ErrorKind::ServerError.code(), -32000);
    }

    #[test]
    fn timeout_carries_sub_kind() {
        let err = Error::timeout("backend dispatch");
        let rpc = err.to_jsonrpc();
        assert_eq!(rpc.code, -32000);
        assert_eq!(rpc.data.unwrap()["kind"], "timeout");
    }
}
