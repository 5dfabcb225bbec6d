//! Errors surfaced by the backend client layer, kept separate from
//! [`mcpgw_protocol::error::Error`] so transport/decode failures are
//! distinguishable from a backend's own JSON-RPC error replies.

use mcpgw_protocol::error::Error as ProtocolError;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("backend returned an rpc error: {0}")]
    Rpc(ProtocolError),

    #[error("client is not initialized")]
    NotInitialized,

    #[error("backend does not support this capability")]
    UnsupportedCapability,
}

impl ClientError {
    /// `true` for failures where retrying the same request against the
    /// same connection is reasonable (transport hiccups), `false` for
    /// failures that will recur (malformed requests, missing capability).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotInitialized)
    }
}

impl From<ClientError> for ProtocolError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Rpc(inner) => inner,
            ClientError::NotInitialized => {
                ProtocolError::internal("backend client not initialized")
            }
            ClientError::UnsupportedCapability => {
                ProtocolError::invalid_request("backend does not support this capability")
            }
            other => ProtocolError::internal(other.to_string()),
        }
    }
}
