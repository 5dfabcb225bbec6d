//! JSON-RPC 2.0 envelope (spec.md §3 `JSONRPCMessage`).

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// JSON-RPC version string carried on every frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request/notification identifier. `String`/`Number` cover the
/// wire representation; notifications omit the field entirely rather than
/// encoding a `Null` variant here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    /// String-typed id.
    String(String),
    /// Numeric id (the gateway's own backend-request ids use this form).
    Number(i64),
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Inbound JSON-RPC request or notification (notifications have `id: None`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: JsonRpcVersionTag,
    /// Method name, e.g. `"tools/call"`.
    pub method: String,
    /// Method parameters, opaque at this layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Present for requests, absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
}

impl JsonRpcRequest {
    /// Build a request with a given id.
    pub fn new(id: MessageId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersionTag,
            method: method.into(),
            params,
            id: Some(id),
        }
    }

    /// `true` if this frame has no id (a notification per spec.md §3).
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A standalone notification (method call without id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: JsonRpcVersionTag,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC response. `result` and `error` are mutually exclusive on the
/// wire; we model that with an enum rather than two `Option` fields so
/// invalid states are unrepresentable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: JsonRpcVersionTag,
    pub id: MessageId,
    #[serde(flatten)]
    pub outcome: JsonRpcOutcome,
}

impl JsonRpcResponse {
    /// Build a success response.
    #[must_use]
    pub fn success(id: MessageId, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersionTag,
            id,
            outcome: JsonRpcOutcome::Result { result },
        }
    }

    /// Build an error response.
    #[must_use]
    pub fn failure(id: MessageId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersionTag,
            id,
            outcome: JsonRpcOutcome::Error { error },
        }
    }
}

/// The mutually-exclusive result/error half of a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcOutcome {
    Result { result: Value },
    Error { error: JsonRpcError },
}

/// JSON-RPC error object (spec.md §3/§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Zero-sized marker that (de)serializes as the literal string `"2.0"` and
/// rejects anything else, the way `turbomcp-protocol::jsonrpc::JsonRpcVersion`
/// does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonRpcVersionTag;

impl Serialize for JsonRpcVersionTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersionTag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s == JSONRPC_VERSION {
            Ok(Self)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version {s}, expected {JSONRPC_VERSION}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let req = JsonRpcRequest::new(
            MessageId::Number(1),
            "tools/call",
            Some(serde_json::json!({"name": "x"})),
        );
        let s = serde_json::to_string(&req).unwrap();
        let back: JsonRpcRequest = serde_json::from_str(&s).unwrap();
        assert_eq!(back.method, "tools/call");
        assert!(!back.is_notification());
    }

    #[test]
    fn notification_has_no_id() {
        let note = JsonRpcNotification {
            jsonrpc: JsonRpcVersionTag,
            method: "notifications/initialized".into(),
            params: None,
        };
        let v = serde_json::to_value(&note).unwrap();
        assert!(v.get("id").is_none());
    }

    #[test]
    fn response_outcome_is_mutually_exclusive() {
        let ok = JsonRpcResponse::success(MessageId::Number(1), serde_json::json!({"ok": true}));
        let v = serde_json::to_value(&ok).unwrap();
        assert!(v.get("result").is_some());
        assert!(v.get("error").is_none());
    }
}
