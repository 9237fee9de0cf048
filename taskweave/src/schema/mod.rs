//! Declarative output schemas with custom predicates.
//!
//! A node that declares an [`OutputSchema`] only completes once its raw
//! output parses as a structured value and validates against the declared
//! shape. Validation failures carry every issue found, with a path into the
//! value, so the repair turn can describe the exact problem to the model.

mod extract;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// One concrete problem found during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    /// Path into the value, e.g. `$.items[0].kind`.
    pub path: String,
    /// What was wrong at that path.
    pub message: String,
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}: {}", self.path, self.message)
    }
}

fn issues_summary(issues: &[SchemaIssue]) -> String {
    issues
        .iter()
        .map(SchemaIssue::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Typed validation failure for structured output.
#[derive(Debug, Clone, Error)]
pub enum SchemaViolation {
    /// The raw output contained no parseable structured value.
    #[error("output is not a parseable structured value: {0}")]
    NotStructured(String),
    /// The value parsed but did not match the declared shape or predicates.
    #[error("invalid structured output: {}", issues_summary(.0))]
    Invalid(Vec<SchemaIssue>),
}

/// Declarative shape of a structured value.
#[derive(Debug, Clone)]
pub enum Shape {
    /// Any value passes.
    Any,
    Bool,
    Integer,
    Number,
    Text,
    /// The value must equal one of the listed values.
    Enumeration(Vec<Value>),
    /// Homogeneous array of the given item shape.
    Array(Box<Shape>),
    /// Object with named fields.
    Object {
        fields: Vec<FieldShape>,
        allow_unknown: bool,
    },
    /// Null, or the inner shape.
    Nullable(Box<Shape>),
}

impl Shape {
    /// An object shape rejecting unknown keys.
    pub fn object(fields: Vec<FieldShape>) -> Self {
        Self::Object {
            fields,
            allow_unknown: false,
        }
    }

    /// An object shape tolerating unknown keys.
    pub fn open_object(fields: Vec<FieldShape>) -> Self {
        Self::Object {
            fields,
            allow_unknown: true,
        }
    }

    pub fn array(item: Shape) -> Self {
        Self::Array(Box::new(item))
    }

    pub fn nullable(inner: Shape) -> Self {
        Self::Nullable(Box::new(inner))
    }

    fn expected_name(&self) -> &'static str {
        match self {
            Self::Any => "any value",
            Self::Bool => "a boolean",
            Self::Integer => "an integer",
            Self::Number => "a number",
            Self::Text => "a string",
            Self::Enumeration(_) => "one of the allowed values",
            Self::Array(_) => "an array",
            Self::Object { .. } => "an object",
            Self::Nullable(_) => "null or the inner shape",
        }
    }
}

/// A named field within an object shape.
#[derive(Debug, Clone)]
pub struct FieldShape {
    pub name: String,
    pub shape: Shape,
    pub required: bool,
}

impl FieldShape {
    pub fn required(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            required: false,
        }
    }
}

/// Custom cross-field check run after shape validation succeeds.
///
/// The closure sees the whole parsed value and returns a description of the
/// violation on failure (e.g. "sequence numbers must be contiguous").
#[derive(Clone)]
pub struct Predicate {
    name: String,
    check: Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>,
}

impl Predicate {
    pub fn new(
        name: impl Into<String>,
        check: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate").field("name", &self.name).finish()
    }
}

/// Declared output schema: a root shape plus custom predicates.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    root: Shape,
    predicates: Vec<Predicate>,
}

impl OutputSchema {
    pub fn new(root: Shape) -> Self {
        Self {
            root,
            predicates: Vec::new(),
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Validates a parsed value against the shape, then the predicates.
    ///
    /// Predicates only run once the shape itself is satisfied, so they can
    /// index into the value without re-checking presence or types.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        let mut issues = Vec::new();
        check_shape(&self.root, value, "$", &mut issues);
        if issues.is_empty() {
            for predicate in &self.predicates {
                if let Err(message) = (predicate.check)(value) {
                    issues.push(SchemaIssue {
                        path: "$".to_string(),
                        message: format!("predicate '{}' failed: {}", predicate.name, message),
                    });
                }
            }
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(SchemaViolation::Invalid(issues))
        }
    }

    /// Interprets raw output as a structured value and validates it.
    ///
    /// Strict parse first, then largest-balanced-substring extraction.
    pub fn coerce(&self, raw: &str) -> Result<Value, SchemaViolation> {
        let value = extract::parse_structured(raw).ok_or_else(|| {
            SchemaViolation::NotStructured(preview(raw, 120))
        })?;
        self.validate(&value)?;
        Ok(value)
    }
}

fn check_shape(shape: &Shape, value: &Value, path: &str, issues: &mut Vec<SchemaIssue>) {
    match shape {
        Shape::Any => {}
        Shape::Bool => {
            if !value.is_boolean() {
                push_mismatch(shape, value, path, issues);
            }
        }
        Shape::Integer => {
            if !(value.is_i64() || value.is_u64()) {
                push_mismatch(shape, value, path, issues);
            }
        }
        Shape::Number => {
            if !value.is_number() {
                push_mismatch(shape, value, path, issues);
            }
        }
        Shape::Text => {
            if !value.is_string() {
                push_mismatch(shape, value, path, issues);
            }
        }
        Shape::Enumeration(allowed) => {
            if !allowed.contains(value) {
                issues.push(SchemaIssue {
                    path: path.to_string(),
                    message: format!(
                        "expected one of {}, found {}",
                        allowed
                            .iter()
                            .map(Value::to_string)
                            .collect::<Vec<_>>()
                            .join(", "),
                        value
                    ),
                });
            }
        }
        Shape::Array(item) => match value {
            Value::Array(items) => {
                for (i, element) in items.iter().enumerate() {
                    check_shape(item, element, &format!("{path}[{i}]"), issues);
                }
            }
            _ => push_mismatch(shape, value, path, issues),
        },
        Shape::Object {
            fields,
            allow_unknown,
        } => match value {
            Value::Object(map) => {
                for field in fields {
                    match map.get(&field.name) {
                        Some(inner) => check_shape(
                            &field.shape,
                            inner,
                            &format!("{path}.{}", field.name),
                            issues,
                        ),
                        None if field.required => issues.push(SchemaIssue {
                            path: format!("{path}.{}", field.name),
                            message: "required field is missing".to_string(),
                        }),
                        None => {}
                    }
                }
                if !allow_unknown {
                    for key in map.keys() {
                        if !fields.iter().any(|f| f.name == *key) {
                            issues.push(SchemaIssue {
                                path: format!("{path}.{key}"),
                                message: "unknown field".to_string(),
                            });
                        }
                    }
                }
            }
            _ => push_mismatch(shape, value, path, issues),
        },
        Shape::Nullable(inner) => {
            if !value.is_null() {
                check_shape(inner, value, path, issues);
            }
        }
    }
}

fn push_mismatch(shape: &Shape, value: &Value, path: &str, issues: &mut Vec<SchemaIssue>) {
    issues.push(SchemaIssue {
        path: path.to_string(),
        message: format!("expected {}, found {}", shape.expected_name(), kind_of(value)),
    });
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "an integer",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn preview(raw: &str, max_len: usize) -> String {
    if raw.len() <= max_len {
        raw.to_string()
    } else {
        format!("{}...", raw.chars().take(max_len).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pair_schema() -> OutputSchema {
        OutputSchema::new(Shape::object(vec![
            FieldShape::required("a", Shape::Integer),
            FieldShape::required("b", Shape::Integer),
        ]))
        .with_predicate(Predicate::new("a < b", |v| {
            let a = v["a"].as_i64().unwrap_or_default();
            let b = v["b"].as_i64().unwrap_or_default();
            if a < b {
                Ok(())
            } else {
                Err(format!("expected a < b, got a={a}, b={b}"))
            }
        }))
    }

    /// **Scenario**: a matching value passes shape and predicate checks.
    #[test]
    fn validate_accepts_matching_value() {
        assert!(pair_schema().validate(&json!({"a": 2, "b": 5})).is_ok());
    }

    /// **Scenario**: a predicate violation is reported with the predicate
    /// name even though the shape matches.
    #[test]
    fn validate_reports_predicate_failure() {
        let err = pair_schema()
            .validate(&json!({"a": 5, "b": 2}))
            .unwrap_err();
        match err {
            SchemaViolation::Invalid(issues) => {
                assert_eq!(issues.len(), 1);
                assert!(issues[0].message.contains("a < b"));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    /// **Scenario**: missing required field and wrong type are both
    /// collected, with paths.
    #[test]
    fn validate_collects_all_issues() {
        let err = pair_schema()
            .validate(&json!({"a": "five"}))
            .unwrap_err();
        match err {
            SchemaViolation::Invalid(issues) => {
                let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
                assert!(paths.contains(&"$.a"));
                assert!(paths.contains(&"$.b"));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    /// **Scenario**: predicates do not run when the shape already failed.
    #[test]
    fn predicates_skipped_on_shape_failure() {
        let schema = OutputSchema::new(Shape::object(vec![FieldShape::required(
            "n",
            Shape::Integer,
        )]))
        .with_predicate(Predicate::new("panicky", |v| {
            // Would report oddly if run against a shape-invalid value.
            if v["n"].as_i64().is_some() {
                Ok(())
            } else {
                Err("n missing".to_string())
            }
        }));
        let err = schema.validate(&json!({"n": "nope"})).unwrap_err();
        match err {
            SchemaViolation::Invalid(issues) => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].path, "$.n");
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    /// **Scenario**: nested arrays and enumerations validate element-wise.
    #[test]
    fn validate_nested_array_with_enumeration() {
        let schema = OutputSchema::new(Shape::object(vec![FieldShape::required(
            "elements",
            Shape::array(Shape::object(vec![
                FieldShape::required(
                    "kind",
                    Shape::Enumeration(vec![json!("text"), json!("artifact")]),
                ),
                FieldShape::required("sequence_number", Shape::Integer),
                FieldShape::optional("title", Shape::nullable(Shape::Text)),
            ])),
        )]));
        let good = json!({"elements": [
            {"kind": "text", "sequence_number": 1, "title": null},
            {"kind": "artifact", "sequence_number": 2},
        ]});
        assert!(schema.validate(&good).is_ok());

        let bad = json!({"elements": [{"kind": "image", "sequence_number": 1}]});
        let err = schema.validate(&bad).unwrap_err();
        match err {
            SchemaViolation::Invalid(issues) => {
                assert_eq!(issues[0].path, "$.elements[0].kind");
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    /// **Scenario**: unknown fields are rejected by closed objects and
    /// tolerated by open ones.
    #[test]
    fn unknown_field_policy() {
        let closed = OutputSchema::new(Shape::object(vec![FieldShape::required(
            "a",
            Shape::Integer,
        )]));
        assert!(closed.validate(&json!({"a": 1, "extra": true})).is_err());

        let open = OutputSchema::new(Shape::open_object(vec![FieldShape::required(
            "a",
            Shape::Integer,
        )]));
        assert!(open.validate(&json!({"a": 1, "extra": true})).is_ok());
    }

    /// **Scenario**: coerce extracts an embedded object, then validates.
    #[test]
    fn coerce_extracts_then_validates() {
        let value = pair_schema()
            .coerce(r#"Here you go: {"a": 2, "b": 5}"#)
            .unwrap();
        assert_eq!(value, json!({"a": 2, "b": 5}));
    }

    /// **Scenario**: coerce on unparseable output yields NotStructured with
    /// a preview of the raw text.
    #[test]
    fn coerce_not_structured() {
        let err = pair_schema().coerce("no data here").unwrap_err();
        assert!(matches!(err, SchemaViolation::NotStructured(p) if p.contains("no data")));
    }
}
