use std::fmt;

use serde_json::{Map, Value, json};
use thiserror::Error;

pub const RESPONSE_FORMAT_FIELD: &str = "response_format";
const RESPONSE_FORMATS: &[&str] = &["markdown", "json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Markdown,
    Json,
}

impl ResponseFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseFormat::Markdown => "markdown",
            ResponseFormat::Json => "json",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "markdown" => Some(ResponseFormat::Markdown),
            "json" => Some(ResponseFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Length bounds count Unicode scalar values.
    Text {
        min_chars: usize,
        max_chars: Option<usize>,
    },
    Integer {
        min: i64,
        max: i64,
        default: Option<i64>,
    },
}

/// One input field of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub description: &'static str,
}

impl FieldSpec {
    pub const fn required_text(
        name: &'static str,
        min_chars: usize,
        max_chars: Option<usize>,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind: FieldKind::Text {
                min_chars,
                max_chars,
            },
            required: true,
            description,
        }
    }

    pub const fn optional_text(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text {
                min_chars: 0,
                max_chars: None,
            },
            required: false,
            description,
        }
    }

    pub const fn integer(
        name: &'static str,
        min: i64,
        max: i64,
        default: i64,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind: FieldKind::Integer {
                min,
                max,
                default: Some(default),
            },
            required: false,
            description,
        }
    }

    fn schema(&self) -> Value {
        let mut schema = match self.kind {
            FieldKind::Text {
                min_chars,
                max_chars,
            } => {
                let mut schema = json!({ "type": "string" });
                if min_chars > 0 {
                    schema["minLength"] = json!(min_chars);
                }
                if let Some(max_chars) = max_chars {
                    schema["maxLength"] = json!(max_chars);
                }
                schema
            }
            FieldKind::Integer { min, max, default } => {
                let mut schema = json!({ "type": "integer", "minimum": min, "maximum": max });
                if let Some(default) = default {
                    schema["default"] = json!(default);
                }
                schema
            }
        };
        schema["description"] = json!(self.description);
        schema
    }
}

/// Which constraint a field violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    ExpectedObject,
    UnknownField,
    Required,
    ExpectedString,
    ExpectedInteger,
    MinLength(usize),
    MaxLength(usize),
    Range { min: i64, max: i64 },
    OneOf(&'static [&'static str]),
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::ExpectedObject => f.write_str("must be a JSON object"),
            Constraint::UnknownField => f.write_str("is not a recognized field"),
            Constraint::Required => f.write_str("is required"),
            Constraint::ExpectedString => f.write_str("must be a string"),
            Constraint::ExpectedInteger => f.write_str("must be an integer"),
            Constraint::MinLength(1) => f.write_str("must not be empty"),
            Constraint::MinLength(min) => write!(f, "must be at least {min} characters"),
            Constraint::MaxLength(max) => write!(f, "must not exceed {max} characters"),
            Constraint::Range { min, max } => write!(f, "must be between {min} and {max}"),
            Constraint::OneOf(allowed) => write!(f, "must be one of: {}", allowed.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Error: Invalid input for field '{field}': {constraint}")]
pub struct ValidationError {
    pub field: String,
    pub constraint: Constraint,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, constraint: Constraint) -> Self {
        Self {
            field: field.into(),
            constraint,
        }
    }
}

/// Tool arguments after validation, with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInput {
    values: Map<String, Value>,
    pub response_format: ResponseFormat,
}

impl ValidatedInput {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// Like `text`, but an empty string counts as absent.
    pub fn non_empty_text(&self, name: &str) -> Option<&str> {
        self.text(name).filter(|value| !value.is_empty())
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }
}

/// Validate raw tool arguments against a field table. Unknown fields are
/// rejected; `null` counts as absent.
pub fn validate(
    fields: &[FieldSpec],
    args: &Map<String, Value>,
) -> Result<ValidatedInput, ValidationError> {
    if let Some(unknown) = args
        .keys()
        .find(|key| *key != RESPONSE_FORMAT_FIELD && !fields.iter().any(|f| f.name == *key))
    {
        return Err(ValidationError::new(unknown.clone(), Constraint::UnknownField));
    }

    let response_format = match args.get(RESPONSE_FORMAT_FIELD) {
        None | Some(Value::Null) => ResponseFormat::default(),
        Some(Value::String(raw)) => ResponseFormat::parse(raw).ok_or_else(|| {
            ValidationError::new(RESPONSE_FORMAT_FIELD, Constraint::OneOf(RESPONSE_FORMATS))
        })?,
        Some(_) => {
            return Err(ValidationError::new(
                RESPONSE_FORMAT_FIELD,
                Constraint::OneOf(RESPONSE_FORMATS),
            ));
        }
    };

    let mut values = Map::new();
    for field in fields {
        let value = args.get(field.name).filter(|value| !value.is_null());
        let Some(value) = value else {
            if field.required {
                return Err(ValidationError::new(field.name, Constraint::Required));
            }
            if let FieldKind::Integer {
                default: Some(default),
                ..
            } = field.kind
            {
                values.insert(field.name.to_string(), json!(default));
            }
            continue;
        };

        let normalized = match field.kind {
            FieldKind::Text {
                min_chars,
                max_chars,
            } => {
                let text = value
                    .as_str()
                    .ok_or_else(|| ValidationError::new(field.name, Constraint::ExpectedString))?;
                let length = text.chars().count();
                if length < min_chars {
                    return Err(ValidationError::new(
                        field.name,
                        Constraint::MinLength(min_chars),
                    ));
                }
                if let Some(max_chars) = max_chars {
                    if length > max_chars {
                        return Err(ValidationError::new(
                            field.name,
                            Constraint::MaxLength(max_chars),
                        ));
                    }
                }
                Value::String(text.to_string())
            }
            FieldKind::Integer { min, max, .. } => {
                let number = integer_value(value)
                    .ok_or_else(|| ValidationError::new(field.name, Constraint::ExpectedInteger))?;
                if number < min || number > max {
                    return Err(ValidationError::new(
                        field.name,
                        Constraint::Range { min, max },
                    ));
                }
                json!(number)
            }
        };
        values.insert(field.name.to_string(), normalized);
    }

    Ok(ValidatedInput {
        values,
        response_format,
    })
}

/// Whole numbers sent as floats (`10.0`) are accepted.
fn integer_value(value: &Value) -> Option<i64> {
    let number = value.as_number()?;
    if let Some(int) = number.as_i64() {
        return Some(int);
    }
    let float = number.as_f64()?;
    if float.fract() == 0.0 && float >= i64::MIN as f64 && float <= i64::MAX as f64 {
        Some(float as i64)
    } else {
        None
    }
}

/// JSON Schema advertised in `tools/list`.
pub fn input_schema(fields: &[FieldSpec]) -> Value {
    let mut properties = Map::new();
    for field in fields {
        properties.insert(field.name.to_string(), field.schema());
    }
    properties.insert(
        RESPONSE_FORMAT_FIELD.to_string(),
        json!({
            "type": "string",
            "enum": RESPONSE_FORMATS,
            "default": "markdown",
            "description": "Output format: 'markdown' for human-readable or 'json' for machine-readable"
        }),
    );
    let required: Vec<&str> = fields
        .iter()
        .filter(|field| field.required)
        .map(|field| field.name)
        .collect();

    let mut schema = json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": false
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::required_text("query", 2, Some(5), "query"),
        FieldSpec::optional_text("project_id", "project"),
        FieldSpec::integer("limit", 1, 100, 10, "limit"),
    ];

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn applies_defaults() {
        let input = validate(FIELDS, &args(json!({ "query": "abc" }))).unwrap();
        assert_eq!(input.text("query"), Some("abc"));
        assert_eq!(input.integer("limit"), Some(10));
        assert_eq!(input.text("project_id"), None);
        assert_eq!(input.response_format, ResponseFormat::Markdown);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = validate(FIELDS, &args(json!({ "query": "abc", "tags": ["x"] }))).unwrap_err();
        assert_eq!(err.field, "tags");
        assert_eq!(err.constraint, Constraint::UnknownField);
    }

    #[test]
    fn length_bounds_count_characters() {
        let err = validate(FIELDS, &args(json!({ "query": "a" }))).unwrap_err();
        assert_eq!(err.constraint, Constraint::MinLength(2));
        assert_eq!(
            err.to_string(),
            "Error: Invalid input for field 'query': must be at least 2 characters"
        );

        let err = validate(FIELDS, &args(json!({ "query": "abcdef" }))).unwrap_err();
        assert_eq!(err.constraint, Constraint::MaxLength(5));

        // five multi-byte characters are still five characters
        assert!(validate(FIELDS, &args(json!({ "query": "ééééé" }))).is_ok());
    }

    #[test]
    fn integer_range_and_type() {
        for limit in [0, 101, -5] {
            let err = validate(FIELDS, &args(json!({ "query": "abc", "limit": limit }))).unwrap_err();
            assert_eq!(err.field, "limit");
            assert_eq!(err.constraint, Constraint::Range { min: 1, max: 100 });
        }
        let err = validate(FIELDS, &args(json!({ "query": "abc", "limit": 2.5 }))).unwrap_err();
        assert_eq!(err.constraint, Constraint::ExpectedInteger);
        let err = validate(FIELDS, &args(json!({ "query": "abc", "limit": "10" }))).unwrap_err();
        assert_eq!(err.constraint, Constraint::ExpectedInteger);

        let input = validate(FIELDS, &args(json!({ "query": "abc", "limit": 25.0 }))).unwrap();
        assert_eq!(input.integer("limit"), Some(25));
    }

    #[test]
    fn response_format_enum() {
        let input = validate(
            FIELDS,
            &args(json!({ "query": "abc", "response_format": "json" })),
        )
        .unwrap();
        assert_eq!(input.response_format, ResponseFormat::Json);

        let err = validate(
            FIELDS,
            &args(json!({ "query": "abc", "response_format": "xml" })),
        )
        .unwrap_err();
        assert_eq!(err.field, RESPONSE_FORMAT_FIELD);
        assert!(err.to_string().contains("markdown, json"));
    }

    #[test]
    fn null_counts_as_absent() {
        let err = validate(FIELDS, &args(json!({ "query": null }))).unwrap_err();
        assert_eq!(err.constraint, Constraint::Required);

        let input = validate(
            FIELDS,
            &args(json!({ "query": "abc", "project_id": null, "limit": null })),
        )
        .unwrap();
        assert_eq!(input.text("project_id"), None);
        assert_eq!(input.integer("limit"), Some(10));
    }

    #[test]
    fn schema_lists_required_fields_and_bounds() {
        let schema = input_schema(FIELDS);
        assert_eq!(schema["required"], json!(["query"]));
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(schema["properties"]["query"]["minLength"], 2);
        assert_eq!(schema["properties"]["limit"]["default"], 10);
        assert_eq!(
            schema["properties"]["response_format"]["enum"],
            json!(["markdown", "json"])
        );
        assert!(schema["properties"]["project_id"].get("minLength").is_none());
    }
}
