use cogniz_core::auth::Credential;
use serde_json::{Value, json};

use crate::dispatch::Dispatcher;
use crate::operations::OPERATIONS;

pub const MCP_SERVER_NAME: &str = "cogniz-memory-platform";
/// Newest first; the first entry is offered when a client asks for
/// something else.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-03-26", "2024-11-05"];

const INSTRUCTIONS: &str = "Cogniz keeps long-term memory across sessions. Call search_memories before answering \
questions that may depend on earlier work, and store_memory for decisions, preferences or notes worth keeping. \
Use list_projects to see how memories are organized and get_stats for plan and usage details.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: -32603,
            message: message.into(),
        }
    }
}

pub fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

/// JSON-RPC front of the tool surface, shared by the stdio and HTTP
/// servers. The credential for a call is passed in, never stored.
#[derive(Debug, Clone)]
pub struct McpServer {
    dispatcher: Dispatcher,
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Handle a single message or a batch. Notifications produce no
    /// response, so the result may be empty.
    pub async fn handle_incoming_message(
        &self,
        incoming: Value,
        credential: Option<&Credential>,
    ) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone(), credential).await
                {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming, credential).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(
        &self,
        incoming: Value,
        credential: Option<&Credential>,
    ) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; this server never sends requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        match obj.get("id").cloned() {
            Some(id) => {
                let result = self.handle_request(method, params, credential).await;
                Some(match result {
                    Ok(payload) => success_response(id, payload),
                    Err(err) => error_response(id, err),
                })
            }
            None => {
                handle_notification(method);
                None
            }
        }
    }

    pub async fn handle_request(
        &self,
        method: &str,
        params: Value,
        credential: Option<&Credential>,
    ) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(initialize_payload(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools_list_payload()),
            "tools/call" => self.handle_tools_call(params, credential).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    async fn handle_tools_call(
        &self,
        params: Value,
        credential: Option<&Credential>,
    ) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let result = self
            .dispatcher
            .dispatch(name, params.get("arguments"), credential)
            .await;
        serde_json::to_value(result)
            .map_err(|e| RpcError::internal(format!("Failed to encode tool result: {e}")))
    }
}

fn handle_notification(method: &str) {
    match method {
        "notifications/initialized" => {
            tracing::debug!(event = "mcp_client_initialized", "Client finished initialization");
        }
        // Cancellation of in-flight calls is handled by the transport.
        "notifications/cancelled" => {}
        other => {
            tracing::debug!(event = "mcp_notification_ignored", method = %other, "Ignoring notification");
        }
    }
}

pub fn negotiate_protocol_version(params: &Value) -> &'static str {
    let requested = params.get("protocolVersion").and_then(Value::as_str);
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .copied()
        .find(|supported| Some(*supported) == requested)
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0])
}

fn initialize_payload(params: &Value) -> Value {
    json!({
        "protocolVersion": negotiate_protocol_version(params),
        "capabilities": {
            "tools": {
                "listChanged": false
            }
        },
        "serverInfo": {
            "name": MCP_SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        },
        "instructions": INSTRUCTIONS
    })
}

fn tools_list_payload() -> Value {
    let tools: Vec<Value> = OPERATIONS.iter().map(|op| op.tool_definition()).collect();
    json!({ "tools": tools })
}
