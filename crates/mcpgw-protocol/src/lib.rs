//! JSON-RPC 2.0 framing and MCP value types shared by every layer of the
//! gateway.
//!
//! This crate defines only the wire-level vocabulary: the envelope
//! (`JsonRpcRequest`/`JsonRpcResponse`/`JsonRpcNotification`), the error
//! code table MCP and JSON-RPC agree on, and the handful of MCP result
//! types (`Tool`, `Resource`, `Prompt`, `CallToolResult`, ...) that the
//! router needs to interpret rather than merely forward.

mod error;
mod jsonrpc;
mod types;

pub use error::{Error, ErrorKind, Result};
pub use jsonrpc::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};
pub use types::{
    CallToolRequest, CallToolResult, ClientCapabilities, Content, GetPromptRequest,
    GetPromptResult, Implementation, InitializeRequest, InitializeResult, MessageId, Prompt,
    PromptArgument, ReadResourceRequest, Resource, ResourceContents, ServerCapabilities, Tool,
    ToolInputSchema,
};

/// The protocol version this gateway negotiates with backends, per
/// spec.md §4.2.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
