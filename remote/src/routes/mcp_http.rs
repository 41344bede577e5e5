use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::{ALLOW, AUTHORIZATION, HOST, LOCATION};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::state::AppState;

const MCP_PATH: &str = "/mcp";

pub fn router() -> Router<AppState> {
    Router::new()
        .route(MCP_PATH, post(mcp_post).get(mcp_get))
        .route("/sse", get(sse_gone))
        .route(
            "/.well-known/oauth-protected-resource",
            get(oauth_protected_resource_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource/mcp",
            get(oauth_protected_resource_metadata),
        )
        .route(
            "/.well-known/oauth-authorization-server",
            get(oauth_authorization_server_missing),
        )
        .route(
            "/.well-known/oauth-authorization-server/mcp",
            get(oauth_authorization_server_missing),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct McpQuery {
    #[serde(default)]
    api_key: Option<String>,
}

async fn mcp_get() -> Response {
    let mut response = StatusCode::METHOD_NOT_ALLOWED.into_response();
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static("POST"));
    response
}

/// The SSE transport is retired; clients must move to `POST /mcp`.
async fn sse_gone() -> Response {
    let mut response = (
        StatusCode::GONE,
        Json(json!({
            "error": "gone",
            "error_description": "The SSE transport is no longer served. Send JSON-RPC requests with POST /mcp.",
        })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(LOCATION, HeaderValue::from_static(MCP_PATH));
    response
}

async fn mcp_post(
    State(state): State<AppState>,
    Query(query): Query<McpQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = Uuid::now_v7();
    let incoming: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => {
            tracing::info!(
                event = "mcp_http_parse_error",
                request_id = %request_id,
                body_len = body.len(),
                "Rejected MCP request body"
            );
            return (
                StatusCode::OK,
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": {
                        "code": -32700,
                        "message": "Parse error"
                    }
                })),
            )
                .into_response();
        }
    };

    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let credential = match state.request_credential(authorization, query.api_key.as_deref()) {
        Ok((credential, source)) => {
            tracing::info!(
                event = "mcp_http_request",
                request_id = %request_id,
                tenancy = state.tenancy.as_str(),
                credential_source = source.as_str(),
                user_agent = ?header_value(&headers, "user-agent"),
                "MCP HTTP request received"
            );
            Some(credential)
        }
        Err(_) => {
            tracing::info!(
                event = "mcp_http_request",
                request_id = %request_id,
                tenancy = state.tenancy.as_str(),
                credential_source = "none",
                user_agent = ?header_value(&headers, "user-agent"),
                "MCP HTTP request received without credential"
            );
            None
        }
    };

    let responses =
        cogniz_mcp_runtime::handle_http_jsonrpc(&state.server, credential.as_ref(), incoming).await;

    if responses.is_empty() {
        return StatusCode::ACCEPTED.into_response();
    }

    if responses.len() == 1 {
        return (
            StatusCode::OK,
            Json(responses.into_iter().next().unwrap_or(Value::Null)),
        )
            .into_response();
    }

    (StatusCode::OK, Json(Value::Array(responses))).into_response()
}

/// Resource metadata without authorization servers: the bearer token is a
/// Cogniz API key, not an OAuth access token.
async fn oauth_protected_resource_metadata(headers: HeaderMap) -> Json<Value> {
    let resource = match request_base_url(&headers) {
        Some(base) => format!("{base}{MCP_PATH}"),
        None => MCP_PATH.to_string(),
    };
    Json(json!({
        "resource": resource,
        "authorization_servers": [],
        "bearer_methods_supported": ["header"],
        "resource_name": "Cogniz Memory Platform",
    }))
}

async fn oauth_authorization_server_missing() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "not_found",
            "error_description": "No OAuth authorization server. Authenticate with a Cogniz API key as a bearer token or an api_key query parameter.",
        })),
    )
        .into_response()
}

fn request_base_url(headers: &HeaderMap) -> Option<String> {
    let forwarded_proto = first_header_token(headers, "x-forwarded-proto");
    let host = first_header_token(headers, "x-forwarded-host").or_else(|| header_value(headers, HOST.as_str()))?;
    let proto = forwarded_proto.unwrap_or_else(|| {
        if host.contains("localhost") || host.starts_with("127.0.0.1") {
            "http".to_string()
        } else {
            "https".to_string()
        }
    });
    Some(format!("{}://{}", proto.trim_end_matches(':'), host))
}

fn header_value(headers: &HeaderMap, key: &str) -> Option<String> {
    headers
        .get(key)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
}

fn first_header_token(headers: &HeaderMap, key: &str) -> Option<String> {
    headers
        .get(key)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}
