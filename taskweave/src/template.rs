//! Input template rendering.
//!
//! Templates contain `{{ name }}` placeholders resolved against the node's
//! [`Context`]. Dotted segments index into object values, so
//! `{{ parent_outputs.collect }}` reads the `collect` key of the
//! `parent_outputs` aggregate. String values render bare; everything else
//! renders as compact JSON.

use serde_json::Value;
use thiserror::Error;

use crate::context::Context;

/// Rendering failure: the template references something the context cannot
/// resolve, or the placeholder syntax is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The placeholder names a variable (or path) absent from the context.
    #[error("unknown placeholder: {0}")]
    UnknownPlaceholder(String),
    /// A `{{` was never closed by `}}`.
    #[error("unterminated placeholder starting at byte {0}")]
    Unterminated(usize),
}

/// Renders `template` against `ctx`, substituting every `{{ name }}`.
pub fn render(template: &str, ctx: &Context) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let close = after_open
            .find("}}")
            .ok_or(TemplateError::Unterminated(offset + open))?;
        let expr = after_open[..close].trim();
        let value = resolve(expr, ctx)
            .ok_or_else(|| TemplateError::UnknownPlaceholder(expr.to_string()))?;
        out.push_str(&value_to_text(value));
        let consumed = open + 2 + close + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Resolves a dotted expression against the context.
///
/// The first segment is a context variable; remaining segments index into
/// object keys or (for numeric segments) array positions.
fn resolve<'a>(expr: &str, ctx: &'a Context) -> Option<&'a Value> {
    let mut segments = expr.split('.');
    let head = segments.next()?;
    let mut current = ctx.get(head)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Renders a value for interpolation: strings bare, other values as JSON.
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
