//! Transport-layer error type.

use thiserror::Error;

/// Result alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Failure modes a [`crate::Transport`] implementation can surface. The
/// pool and router translate these into the `upstream_unavailable`/
/// `timeout` JSON-RPC kinds from spec.md §7.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not establish the underlying connection.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The transport was asked to send/receive while not connected.
    #[error("not connected")]
    NotConnected,

    /// A `receive` call exceeded its deadline (spec.md §4.1 stdio 30s,
    /// §5 backend request 30s default).
    #[error("receive timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The peer closed the connection or wrote malformed framing.
    #[error("broken pipe: {0}")]
    BrokenPipe(String),

    /// A frame could not be parsed as JSON-RPC.
    #[error("frame decode error: {0}")]
    Decode(String),

    /// The bounded inbound buffer was full and the frame was dropped
    /// (spec.md §4.1 stdio "100 inbound frames").
    #[error("inbound buffer full, frame dropped")]
    BufferFull,

    /// The operation was cancelled via its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Any I/O failure not covered above.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// `true` for failures that justify quarantining the backend and
    /// letting the load balancer re-select (spec.md §7 "Broken-pipe
    /// errors... quarantine the backend").
    #[must_use]
    pub const fn should_quarantine_backend(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed(_) | Self::NotConnected | Self::BrokenPipe(_) | Self::Timeout(_)
        )
    }
}
