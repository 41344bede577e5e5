//! Markdown and JSON renderings of memory API responses.
//!
//! Remote payloads are loosely typed, so every field goes through a
//! first-defined-wins lookup where `null` counts as missing. Missing
//! optional fields are left out of the output instead of rendered as
//! placeholders.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::validate::ValidatedInput;

pub const PREVIEW_CHARS: usize = 200;
const RECENT_ACTIVITY_LIMIT: usize = 5;

/// Context an operation is shaped in, beyond its validated input.
#[derive(Debug, Clone, Copy)]
pub struct ShapeContext<'a> {
    pub default_project_id: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("Unexpected response from the memory API: expected {0}")]
    UnexpectedShape(&'static str),
}

/// First 200 characters, with `...` appended only when something was cut.
pub fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// Render a timestamp as the local calendar day. Unparseable input is
/// returned as-is.
pub fn format_day(raw: &str) -> String {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Local).format("%Y-%m-%d").to_string();
    }
    for layout in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, layout) {
            return parsed.date().format("%Y-%m-%d").to_string();
        }
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return parsed.format("%Y-%m-%d").to_string();
    }
    raw.to_string()
}

/// Fixed-point rendering with ties rounded away from zero.
fn fixed(value: f64, digits: usize) -> String {
    let scale = 10_f64.powi(digits as i32);
    let rounded = (value * scale).round() / scale;
    format!("{rounded:.digits$}")
}

fn first_defined<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| body.get(*key))
        .find(|value| !value.is_null())
}

fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn display_day(value: &Value) -> String {
    match value {
        Value::String(text) => format_day(text),
        other => display(other),
    }
}

fn non_empty_field<'a>(body: &'a Value, key: &str) -> Option<&'a Value> {
    first_defined(body, &[key]).filter(|value| value.as_str() != Some(""))
}

fn insert_opt(target: &mut Map<String, Value>, key: &str, value: Option<&Value>) {
    if let Some(value) = value {
        target.insert(key.to_string(), value.clone());
    }
}

/// Array payload, either top level or under one of `keys`. A `null` body
/// is an empty list.
fn list_payload<'a>(
    body: &'a Value,
    keys: &[&str],
    expected: &'static str,
) -> Result<&'a [Value], ShapeError> {
    match body {
        Value::Null => Ok(&[]),
        Value::Array(items) => Ok(items),
        Value::Object(_) => first_defined(body, keys)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .ok_or(ShapeError::UnexpectedShape(expected)),
        _ => Err(ShapeError::UnexpectedShape(expected)),
    }
}

fn requested_project<'a>(input: &'a ValidatedInput, ctx: &ShapeContext<'a>) -> &'a str {
    input
        .non_empty_text("project_id")
        .unwrap_or(ctx.default_project_id)
}

// store_memory

pub fn store_markdown(
    input: &ValidatedInput,
    body: &Value,
    ctx: &ShapeContext<'_>,
) -> Result<String, ShapeError> {
    let mut lines = vec!["# ✅ Memory Stored Successfully".to_string(), String::new()];
    if let Some(id) = first_defined(body, &["memory_id", "id"]) {
        lines.push(format!("**Memory ID**: {}", display(id)));
    }
    let project = first_defined(body, &["project_name", "project_id"])
        .map(display)
        .unwrap_or_else(|| requested_project(input, ctx).to_string());
    lines.push(format!("**Project**: {project}"));
    if body.get("compressed").and_then(Value::as_bool) == Some(true) {
        lines.push("**Compressed**: Yes".to_string());
    }
    if let Some(category) = input.non_empty_text("category") {
        lines.push(format!("**Category**: {category}"));
    }
    lines.push(String::new());
    lines.push("Your memory has been saved and can be retrieved in future sessions.".to_string());
    Ok(lines.join("\n"))
}

pub fn store_json(
    _input: &ValidatedInput,
    body: &Value,
    _ctx: &ShapeContext<'_>,
) -> Result<Value, ShapeError> {
    let mut envelope = Map::new();
    envelope.insert("success".to_string(), json!(true));
    insert_opt(&mut envelope, "memory_id", first_defined(body, &["memory_id", "id"]));
    insert_opt(
        &mut envelope,
        "project",
        first_defined(body, &["project_name", "project_id"]),
    );
    let compressed = body
        .get("compressed")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    envelope.insert("compressed".to_string(), json!(compressed));
    envelope.insert("message".to_string(), json!("Memory stored successfully"));
    Ok(Value::Object(envelope))
}

// search_memories

fn search_results(body: &Value) -> Result<&[Value], ShapeError> {
    list_payload(body, &["results", "memories"], "a list of memories")
}

fn memory_content(memory: &Value) -> String {
    first_defined(memory, &["content"])
        .map(display)
        .unwrap_or_default()
}

fn empty_search_message(input: &ValidatedInput) -> String {
    format!(
        "No memories found matching '{}'",
        input.text("query").unwrap_or_default()
    )
}

pub fn search_markdown(
    input: &ValidatedInput,
    body: &Value,
    _ctx: &ShapeContext<'_>,
) -> Result<String, ShapeError> {
    let results = search_results(body)?;
    if results.is_empty() {
        return Ok(empty_search_message(input));
    }

    let query = input.text("query").unwrap_or_default();
    let noun = if results.len() == 1 { "memory" } else { "memories" };
    let mut lines = vec![
        format!("# Search Results: \"{query}\""),
        String::new(),
        format!("Found {} {noun}", results.len()),
        String::new(),
    ];
    for memory in results {
        let project = first_defined(memory, &["project_name"])
            .map(display)
            .unwrap_or_else(|| "Unnamed Project".to_string());
        lines.push(format!("## {project}"));
        if let Some(score) =
            first_defined(memory, &["relevance_score", "relevance"]).and_then(Value::as_f64)
        {
            lines.push(format!("**Relevance**: {}%", fixed(score * 100.0, 0)));
        }
        if let Some(category) = non_empty_field(memory, "category") {
            lines.push(format!("**Category**: {}", display(category)));
        }
        if let Some(created) = first_defined(memory, &["created_at"]) {
            lines.push(format!("**Created**: {}", display_day(created)));
        }
        lines.push(String::new());
        lines.push(preview(&memory_content(memory)));
        lines.push(String::new());
        if let Some(id) = first_defined(memory, &["id", "memory_id"]) {
            lines.push(format!("*Memory ID: {}*", display(id)));
        }
        lines.push("---".to_string());
        lines.push(String::new());
    }
    Ok(lines.join("\n"))
}

pub fn search_json(
    _input: &ValidatedInput,
    body: &Value,
    _ctx: &ShapeContext<'_>,
) -> Result<Value, ShapeError> {
    let results = search_results(body)?;
    let memories: Vec<Value> = results
        .iter()
        .map(|memory| {
            let mut item = Map::new();
            insert_opt(&mut item, "id", first_defined(memory, &["id", "memory_id"]));
            item.insert("content".to_string(), json!(preview(&memory_content(memory))));
            insert_opt(&mut item, "project", first_defined(memory, &["project_name"]));
            insert_opt(&mut item, "category", first_defined(memory, &["category"]));
            insert_opt(
                &mut item,
                "relevance",
                first_defined(memory, &["relevance_score", "relevance"]),
            );
            insert_opt(&mut item, "created", first_defined(memory, &["created_at"]));
            Value::Object(item)
        })
        .collect();
    Ok(json!({
        "success": true,
        "count": memories.len(),
        "memories": memories,
    }))
}

// delete_memory

pub fn delete_markdown(
    input: &ValidatedInput,
    _body: &Value,
    _ctx: &ShapeContext<'_>,
) -> Result<String, ShapeError> {
    let memory_id = input.text("memory_id").unwrap_or_default();
    Ok(format!(
        "# ✅ Memory Deleted\n\n**Memory ID**: {memory_id}\n\nThe memory has been permanently removed."
    ))
}

pub fn delete_json(
    input: &ValidatedInput,
    _body: &Value,
    _ctx: &ShapeContext<'_>,
) -> Result<Value, ShapeError> {
    let memory_id = input.text("memory_id").unwrap_or_default();
    Ok(json!({
        "success": true,
        "memory_id": memory_id,
        "message": format!("Memory {memory_id} deleted successfully"),
    }))
}

// get_stats

fn stats_object(body: &Value) -> Result<&Value, ShapeError> {
    if body.is_object() {
        Ok(body)
    } else {
        Err(ShapeError::UnexpectedShape("an object with account statistics"))
    }
}

fn projects_summary(stats: &Value) -> Option<String> {
    let count = first_defined(stats, &["projects_count"])?;
    Some(match first_defined(stats, &["projects_limit"]) {
        Some(limit) if limit.as_i64() == Some(-1) => format!("{} / unlimited", display(count)),
        Some(limit) => format!("{} / {}", display(count), display(limit)),
        None => display(count),
    })
}

fn storage_summary(stats: &Value) -> Option<String> {
    let used = first_defined(stats, &["memory_usage_mb", "storage_used_mb"])?;
    let used = match used.as_f64() {
        Some(megabytes) => format!("{} MB", fixed(megabytes, 2)),
        None => format!("{} MB", display(used)),
    };
    Some(match first_defined(stats, &["memory_limit_mb"]) {
        Some(limit) if limit.as_i64() == Some(-1) => format!("{used} / unlimited"),
        Some(limit) => format!("{used} / {} MB", display(limit)),
        None => used,
    })
}

fn compression_summary(stats: &Value) -> Option<String> {
    first_defined(stats, &["avg_compression"])
        .and_then(Value::as_f64)
        .map(|ratio| format!("{}x", fixed(ratio, 2)))
}

pub fn stats_markdown(
    _input: &ValidatedInput,
    body: &Value,
    _ctx: &ShapeContext<'_>,
) -> Result<String, ShapeError> {
    let stats = stats_object(body)?;
    let mut lines = vec!["# Cogniz Platform Statistics".to_string(), String::new()];
    if let Some(plan) = first_defined(stats, &["plan_name", "plan"]) {
        lines.push(format!("**Plan**: {}", display(plan)));
    }
    if let Some(projects) = projects_summary(stats) {
        lines.push(format!("**Projects**: {projects}"));
    }
    if let Some(total) = first_defined(stats, &["total_memories"]) {
        lines.push(format!("**Total Memories**: {}", display(total)));
    }
    if let Some(storage) = storage_summary(stats) {
        lines.push(format!("**Storage Used**: {storage}"));
    }
    if let Some(calls) = first_defined(stats, &["api_calls_month"]) {
        lines.push(format!("**API Calls This Month**: {}", display(calls)));
    }
    if let Some(compression) = compression_summary(stats) {
        lines.push(format!("**Average Compression**: {compression}"));
    }

    let activity = first_defined(stats, &["recent_activity"])
        .and_then(Value::as_array)
        .filter(|entries| !entries.is_empty());
    if let Some(entries) = activity {
        lines.push(String::new());
        lines.push("## Recent Activity".to_string());
        lines.push(String::new());
        for entry in entries.iter().take(RECENT_ACTIVITY_LIMIT) {
            let action = first_defined(entry, &["action"])
                .map(display)
                .unwrap_or_else(|| display(entry));
            match first_defined(entry, &["timestamp"]) {
                Some(timestamp) => lines.push(format!("- {action} ({})", display_day(timestamp))),
                None => lines.push(format!("- {action}")),
            }
        }
    }

    if let Some(active) = first_defined(stats, &["plan_active"]).and_then(Value::as_bool) {
        lines.push(String::new());
        lines.push(if active { "✅ Plan Active" } else { "❌ Plan Inactive" }.to_string());
    }
    Ok(lines.join("\n"))
}

pub fn stats_json(
    _input: &ValidatedInput,
    body: &Value,
    _ctx: &ShapeContext<'_>,
) -> Result<Value, ShapeError> {
    let stats = stats_object(body)?;
    let mut summary = Map::new();
    insert_opt(&mut summary, "plan", first_defined(stats, &["plan_name", "plan"]));
    if let Some(projects) = projects_summary(stats) {
        summary.insert("projects".to_string(), json!(projects));
    }
    insert_opt(&mut summary, "memories", first_defined(stats, &["total_memories"]));
    if let Some(storage) = storage_summary(stats) {
        summary.insert("storage".to_string(), json!(storage));
    }
    insert_opt(
        &mut summary,
        "api_calls_month",
        first_defined(stats, &["api_calls_month"]),
    );
    if let Some(compression) = compression_summary(stats) {
        summary.insert("avg_compression".to_string(), json!(compression));
    }
    insert_opt(&mut summary, "plan_active", first_defined(stats, &["plan_active"]));
    insert_opt(
        &mut summary,
        "recent_activity",
        first_defined(stats, &["recent_activity"]),
    );
    Ok(json!({ "success": true, "stats": summary }))
}

// list_projects

const NO_PROJECTS: &str = "No projects found. Create your first memory to start a project!";

fn project_list(body: &Value) -> Result<&[Value], ShapeError> {
    list_payload(body, &["projects"], "a list of projects")
}

pub fn projects_markdown(
    _input: &ValidatedInput,
    body: &Value,
    _ctx: &ShapeContext<'_>,
) -> Result<String, ShapeError> {
    let projects = project_list(body)?;
    if projects.is_empty() {
        return Ok(NO_PROJECTS.to_string());
    }

    let mut lines = vec![format!("# Cogniz Projects ({})", projects.len()), String::new()];
    for project in projects {
        let heading = first_defined(project, &["name", "id"])
            .map(display)
            .unwrap_or_else(|| "Unnamed Project".to_string());
        lines.push(format!("## {heading}"));
        if let Some(description) = non_empty_field(project, "description") {
            lines.push(display(description));
        }
        let memories = first_defined(project, &["memory_count"])
            .map(display)
            .unwrap_or_else(|| "0".to_string());
        lines.push(format!("**Memories**: {memories}"));
        if let Some(activity) = first_defined(project, &["last_activity", "created_at"]) {
            lines.push(format!("**Last Activity**: {}", display_day(activity)));
        }
        if let Some(id) = first_defined(project, &["id"]) {
            lines.push(format!("**Project ID**: {}", display(id)));
        }
        lines.push(String::new());
    }
    Ok(lines.join("\n"))
}

pub fn projects_json(
    _input: &ValidatedInput,
    body: &Value,
    _ctx: &ShapeContext<'_>,
) -> Result<Value, ShapeError> {
    let projects: Vec<Value> = project_list(body)?
        .iter()
        .map(|project| {
            let mut item = Map::new();
            insert_opt(&mut item, "id", first_defined(project, &["id"]));
            insert_opt(&mut item, "name", first_defined(project, &["name"]));
            insert_opt(&mut item, "description", first_defined(project, &["description"]));
            let memories = first_defined(project, &["memory_count"])
                .cloned()
                .unwrap_or_else(|| json!(0));
            item.insert("memories".to_string(), memories);
            insert_opt(
                &mut item,
                "last_updated",
                first_defined(project, &["last_activity", "created_at"]),
            );
            Value::Object(item)
        })
        .collect();
    Ok(json!({
        "success": true,
        "count": projects.len(),
        "projects": projects,
    }))
}
