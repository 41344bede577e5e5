//! MCP runtime for the Cogniz memory platform.
//!
//! One dispatch core (validate, call the memory API, shape the response)
//! behind a JSON-RPC server that both the stdio and the HTTP binaries use.

mod dispatch;
pub mod operations;
mod server;
pub mod shape;
pub mod stdio;
pub mod transport;
pub mod validate;

use cogniz_core::auth::Credential;
use serde_json::Value;

pub use dispatch::{
    Dispatcher, REMOTE_PLATFORM, RuntimeDefaults, STDIO_PLATFORM, ToolContent, ToolResult,
};
pub use server::{
    MCP_SERVER_NAME, McpServer, RpcError, SUPPORTED_PROTOCOL_VERSIONS, error_response,
    negotiate_protocol_version, success_response,
};
pub use stdio::serve_stdio;

/// Handle one HTTP JSON-RPC body (single message or batch) with the
/// credential resolved for that request.
pub async fn handle_http_jsonrpc(
    server: &McpServer,
    credential: Option<&Credential>,
    incoming: Value,
) -> Vec<Value> {
    server.handle_incoming_message(incoming, credential).await
}

pub fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
