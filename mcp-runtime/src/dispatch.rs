use std::sync::Arc;
use std::time::{Duration, Instant};

use cogniz_core::auth::{AuthError, Credential};
use cogniz_core::config::ResolvedConfig;
use cogniz_core::error::{ApiError, codes};
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;
use uuid::Uuid;

use crate::operations::{OperationSpec, ProjectionContext, find_operation, tool_names};
use crate::shape::ShapeContext;
use crate::to_pretty_json;
use crate::transport::ApiClient;
use crate::validate::{Constraint, ResponseFormat, ValidatedInput, ValidationError, validate};

/// `ai_platform` tag for memories stored through the stdio server.
pub const STDIO_PLATFORM: &str = "claude-mcp";
/// `ai_platform` tag for memories stored through the HTTP server.
pub const REMOTE_PLATFORM: &str = "claude-remote-mcp";

/// Read-only settings shared by every invocation.
#[derive(Debug, Clone)]
pub struct RuntimeDefaults {
    pub endpoint_base: Url,
    pub default_project_id: String,
    pub client_platform: String,
}

impl RuntimeDefaults {
    pub fn from_config(config: &ResolvedConfig, client_platform: &str) -> Self {
        Self {
            endpoint_base: config.endpoint_base.clone(),
            default_project_id: config.default_project_id.clone(),
            client_platform: client_platform.to_string(),
        }
    }

    fn endpoint_display(&self) -> String {
        self.endpoint_base.as_str().trim_end_matches('/').to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

/// Result of one `tools/call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: true,
        }
    }

    pub fn first_text(&self) -> &str {
        match self.content.first() {
            Some(ToolContent::Text { text }) => text,
            None => "",
        }
    }
}

/// Binds validation, transport and shaping for every registered tool.
/// Cheap to clone; clones share one HTTP client.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: ApiClient,
    defaults: Arc<RuntimeDefaults>,
}

impl Dispatcher {
    pub fn new(defaults: RuntimeDefaults) -> Self {
        let client = ApiClient::new(defaults.endpoint_display());
        Self {
            client,
            defaults: Arc::new(defaults),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self
    }

    /// Run one tool call. Never fails: every problem becomes an
    /// `isError` result with a single actionable sentence.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<&Value>,
        credential: Option<&Credential>,
    ) -> ToolResult {
        let invocation_id = Uuid::now_v7();
        let Some(op) = find_operation(name) else {
            tracing::warn!(
                event = "tool_call_rejected",
                invocation_id = %invocation_id,
                tool = %name,
                error_code = codes::UNKNOWN_TOOL,
                "Unknown tool"
            );
            let available: Vec<&str> = tool_names().collect();
            return ToolResult::error(format!(
                "Error: Unknown tool '{name}'. Available tools: {}",
                available.join(", ")
            ));
        };

        let input = match validate_arguments(op, arguments) {
            Ok(input) => input,
            Err(err) => {
                tracing::info!(
                    event = "tool_call_rejected",
                    invocation_id = %invocation_id,
                    tool = op.name,
                    field = %err.field,
                    error_code = codes::VALIDATION_FAILED,
                    "Tool arguments failed validation"
                );
                return ToolResult::error(err.to_string());
            }
        };

        let Some(credential) = credential else {
            tracing::info!(
                event = "tool_call_rejected",
                invocation_id = %invocation_id,
                tool = op.name,
                error_code = codes::AUTH_REQUIRED,
                "No credential for tool call"
            );
            return ToolResult::error(AuthError::Missing.to_string());
        };

        let started = Instant::now();
        let outcome = self.execute(op, &input, credential).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(text) => {
                tracing::info!(
                    event = "tool_call_completed",
                    invocation_id = %invocation_id,
                    tool = op.name,
                    response_format = input.response_format.as_str(),
                    duration_ms,
                    "Tool call completed"
                );
                ToolResult::text(text)
            }
            Err(err) => {
                tracing::warn!(
                    event = "tool_call_failed",
                    invocation_id = %invocation_id,
                    tool = op.name,
                    error_code = err.code(),
                    duration_ms,
                    "Tool call failed"
                );
                ToolResult::error(err.to_string())
            }
        }
    }

    async fn execute(
        &self,
        op: &OperationSpec,
        input: &ValidatedInput,
        credential: &Credential,
    ) -> Result<String, ApiError> {
        let defaults = &*self.defaults;
        let projection = ProjectionContext {
            default_project_id: &defaults.default_project_id,
            client_platform: &defaults.client_platform,
        };
        let descriptor = op.request(input, &projection, &defaults.endpoint_base, credential)?;
        tracing::debug!(
            event = "memory_api_request",
            method = descriptor.method.as_str(),
            path = descriptor.url.path(),
            "Calling memory API"
        );
        let body = self.client.execute(descriptor).await?;

        let ctx = ShapeContext {
            default_project_id: &defaults.default_project_id,
        };
        let rendered = match input.response_format {
            ResponseFormat::Markdown => (op.markdown)(input, &body, &ctx),
            ResponseFormat::Json => (op.json)(input, &body, &ctx).map(|value| to_pretty_json(&value)),
        };
        rendered.map_err(|err| ApiError::Unknown(err.to_string()))
    }
}

fn validate_arguments(
    op: &OperationSpec,
    arguments: Option<&Value>,
) -> Result<ValidatedInput, ValidationError> {
    let empty = Map::new();
    let args = match arguments {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(map)) => map,
        Some(_) => return Err(ValidationError::new("arguments", Constraint::ExpectedObject)),
    };
    validate(op.fields, args)
}
