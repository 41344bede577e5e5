//! Static registry of the Cogniz memory tools.
//!
//! Every tool is one `OperationSpec`: field table, HTTP route, projector,
//! and the two shapers. The dispatcher never special-cases a tool name.

use cogniz_core::auth::Credential;
use cogniz_core::error::ApiError;
use serde_json::{Map, Value, json};
use url::Url;

use crate::shape::{self, ShapeContext, ShapeError};
use crate::transport::{HttpMethod, RequestDescriptor, api_url};
use crate::validate::{FieldSpec, ValidatedInput, input_schema};

/// Accepted in front of every tool name for older clients.
pub const LEGACY_TOOL_PREFIX: &str = "cogniz_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolAnnotations {
    pub read_only: bool,
    pub destructive: bool,
    pub idempotent: bool,
    pub open_world: bool,
}

impl ToolAnnotations {
    pub fn to_value(self) -> Value {
        json!({
            "readOnlyHint": self.read_only,
            "destructiveHint": self.destructive,
            "idempotentHint": self.idempotent,
            "openWorldHint": self.open_world,
        })
    }
}

/// Defaults merged into every request.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionContext<'a> {
    pub default_project_id: &'a str,
    /// Value of `ai_platform` on stored memories.
    pub client_platform: &'a str,
}

/// Operation-specific parts of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParts {
    pub path_params: Vec<(&'static str, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

pub type Projector = fn(&ValidatedInput, &ProjectionContext<'_>) -> RequestParts;
pub type MarkdownShaper =
    fn(&ValidatedInput, &Value, &ShapeContext<'_>) -> Result<String, ShapeError>;
pub type JsonShaper = fn(&ValidatedInput, &Value, &ShapeContext<'_>) -> Result<Value, ShapeError>;

pub struct OperationSpec {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub annotations: ToolAnnotations,
    pub fields: &'static [FieldSpec],
    pub method: HttpMethod,
    /// Relative to the API root; `{name}` is filled from a path param.
    pub path: &'static str,
    pub project: Projector,
    pub markdown: MarkdownShaper,
    pub json: JsonShaper,
}

impl OperationSpec {
    pub fn tool_definition(&self) -> Value {
        json!({
            "name": self.name,
            "title": self.title,
            "description": self.description,
            "inputSchema": input_schema(self.fields),
            "annotations": self.annotations.to_value(),
        })
    }

    pub fn request(
        &self,
        input: &ValidatedInput,
        ctx: &ProjectionContext<'_>,
        endpoint_base: &Url,
        credential: &Credential,
    ) -> Result<RequestDescriptor, ApiError> {
        let parts = (self.project)(input, ctx);
        let mut segments = Vec::new();
        for segment in self.path.split('/').filter(|s| !s.is_empty()) {
            match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(param) => {
                    let value = parts
                        .path_params
                        .iter()
                        .find(|(name, _)| *name == param)
                        .map(|(_, value)| value.as_str())
                        .ok_or_else(|| {
                            ApiError::Unknown(format!("Missing path parameter '{param}'"))
                        })?;
                    segments.push(value);
                }
                None => segments.push(segment),
            }
        }

        let mut descriptor =
            RequestDescriptor::new(self.method, api_url(endpoint_base, segments)?, credential);
        descriptor.query = parts.query;
        descriptor.body = parts.body;
        Ok(descriptor)
    }
}

/// Look up a tool by name, accepting the legacy `cogniz_` prefix.
pub fn find_operation(name: &str) -> Option<&'static OperationSpec> {
    let name = name.strip_prefix(LEGACY_TOOL_PREFIX).unwrap_or(name);
    OPERATIONS.iter().find(|op| op.name == name)
}

pub fn tool_names() -> impl Iterator<Item = &'static str> {
    OPERATIONS.iter().map(|op| op.name)
}

fn target_project<'a>(input: &'a ValidatedInput, ctx: &ProjectionContext<'a>) -> &'a str {
    input
        .non_empty_text("project_id")
        .unwrap_or(ctx.default_project_id)
}

fn project_store(input: &ValidatedInput, ctx: &ProjectionContext<'_>) -> RequestParts {
    let mut body = Map::new();
    body.insert(
        "content".to_string(),
        json!(input.text("content").unwrap_or_default()),
    );
    body.insert("project_id".to_string(), json!(target_project(input, ctx)));
    for field in ["project_name", "category"] {
        if let Some(value) = input.text(field) {
            body.insert(field.to_string(), json!(value));
        }
    }
    body.insert("ai_platform".to_string(), json!(ctx.client_platform));
    RequestParts {
        body: Some(Value::Object(body)),
        ..RequestParts::default()
    }
}

fn project_search(input: &ValidatedInput, ctx: &ProjectionContext<'_>) -> RequestParts {
    let limit = input.integer("limit").unwrap_or(DEFAULT_SEARCH_LIMIT);
    RequestParts {
        query: vec![
            (
                "query".to_string(),
                input.text("query").unwrap_or_default().to_string(),
            ),
            ("limit".to_string(), limit.to_string()),
            ("project_id".to_string(), target_project(input, ctx).to_string()),
        ],
        ..RequestParts::default()
    }
}

fn project_delete(input: &ValidatedInput, _ctx: &ProjectionContext<'_>) -> RequestParts {
    RequestParts {
        path_params: vec![(
            "memory_id",
            input.text("memory_id").unwrap_or_default().to_string(),
        )],
        ..RequestParts::default()
    }
}

fn project_nothing(_input: &ValidatedInput, _ctx: &ProjectionContext<'_>) -> RequestParts {
    RequestParts::default()
}

const DEFAULT_SEARCH_LIMIT: i64 = 10;

const STORE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required_text(
        "content",
        1,
        Some(50_000),
        "The memory content to store (1-50,000 characters)",
    ),
    FieldSpec::optional_text(
        "project_id",
        "Project identifier. Uses the configured default project when omitted",
    ),
    FieldSpec::optional_text("project_name", "Human-readable project name"),
    FieldSpec::optional_text(
        "category",
        "Category tag such as 'meeting-notes', 'code-snippets' or 'ideas'",
    ),
];

const SEARCH_FIELDS: &[FieldSpec] = &[
    FieldSpec::required_text(
        "query",
        2,
        Some(500),
        "Search query text to find relevant memories (2-500 characters)",
    ),
    FieldSpec::optional_text("project_id", "Limit the search to one project"),
    FieldSpec::integer(
        "limit",
        1,
        100,
        DEFAULT_SEARCH_LIMIT,
        "Maximum number of results to return (1-100, default: 10)",
    ),
];

const DELETE_FIELDS: &[FieldSpec] = &[FieldSpec::required_text(
    "memory_id",
    1,
    None,
    "The unique memory ID, e.g. 'local_abc123' or 'memory_456'",
)];

pub static OPERATIONS: [OperationSpec; 5] = [
    OperationSpec {
        name: "store_memory",
        title: "Store Memory in Cogniz Platform",
        description: "Store a new memory in the Cogniz Memory Platform for persistent context across sessions.\n\n\
Saves conversation context, decisions, code snippets, meeting notes or any content worth remembering across sessions. \
Memories are searchable and organized by project.\n\n\
Use when: \"Remember this database schema for later\" (category='code-snippets') or \"Save the meeting summary\" (category='meeting-notes').\n\
Don't use when: looking up existing memories (use search_memories).",
        annotations: ToolAnnotations {
            read_only: false,
            destructive: false,
            idempotent: false,
            open_world: true,
        },
        fields: STORE_FIELDS,
        method: HttpMethod::Post,
        path: "/store",
        project: project_store,
        markdown: shape::store_markdown,
        json: shape::store_json,
    },
    OperationSpec {
        name: "search_memories",
        title: "Search Cogniz Memories",
        description: "Semantic search across the memories stored in the Cogniz Platform.\n\n\
Finds memories relevant to the query across content, categories and projects. Results include a relevance score and a \
200-character content preview.\n\n\
Use when: \"What did we decide about the API design?\" or \"Find the database schema notes\".\n\
Don't use when: saving new information (use store_memory).",
        annotations: ToolAnnotations {
            read_only: true,
            destructive: false,
            idempotent: true,
            open_world: true,
        },
        fields: SEARCH_FIELDS,
        method: HttpMethod::Get,
        path: "/search",
        project: project_search,
        markdown: shape::search_markdown,
        json: shape::search_json,
    },
    OperationSpec {
        name: "delete_memory",
        title: "Delete Cogniz Memory",
        description: "Permanently delete one memory from the Cogniz Platform by its ID. This cannot be undone.\n\n\
Use when: \"Delete memory local_abc123\" or \"Remove that outdated note\".\n\
Don't use when: updating a memory (delete it and store a new one instead).",
        annotations: ToolAnnotations {
            read_only: false,
            destructive: true,
            idempotent: true,
            open_world: true,
        },
        fields: DELETE_FIELDS,
        method: HttpMethod::Delete,
        path: "/delete/{memory_id}",
        project: project_delete,
        markdown: shape::delete_markdown,
        json: shape::delete_json,
    },
    OperationSpec {
        name: "get_stats",
        title: "Get Cogniz Usage Statistics",
        description: "Usage statistics and plan information for the Cogniz account: plan, project count, memory count, \
storage, API calls this month, compression ratio and recent activity.\n\n\
Use when: \"How many memories do I have?\" or \"What's my current plan?\".",
        annotations: ToolAnnotations {
            read_only: true,
            destructive: false,
            idempotent: true,
            open_world: true,
        },
        fields: &[],
        method: HttpMethod::Get,
        path: "/user-stats",
        project: project_nothing,
        markdown: shape::stats_markdown,
        json: shape::stats_json,
    },
    OperationSpec {
        name: "list_projects",
        title: "List Cogniz Projects",
        description: "List all projects in the Cogniz account with memory counts and last activity dates.\n\n\
Use when: \"Show all my projects\" or \"Which project has the most memories?\".",
        annotations: ToolAnnotations {
            read_only: true,
            destructive: false,
            idempotent: true,
            open_world: true,
        },
        fields: &[],
        method: HttpMethod::Get,
        path: "/projects",
        project: project_nothing,
        markdown: shape::projects_markdown,
        json: shape::projects_json,
    },
];
