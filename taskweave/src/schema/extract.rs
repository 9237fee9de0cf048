//! Structured-literal extraction from raw model output.
//!
//! Strict parse first; when that fails, locate the largest balanced
//! `{…}`/`[…]` substring (string- and escape-aware) and parse that. Models
//! often wrap structured answers in prose or code fences; extraction keeps
//! the repair cycle from firing on formatting alone.

use serde_json::Value;

/// Parses raw output as a structured value, with balanced-substring
/// fallback. Returns `None` when nothing parseable is present.
pub(crate) fn parse_structured(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    let mut candidates = balanced_spans(raw);
    candidates.sort_by_key(|span| std::cmp::Reverse(span.len()));
    candidates
        .into_iter()
        .find_map(|span| serde_json::from_str::<Value>(span).ok())
}

/// Collects top-level balanced `{…}`/`[…]` spans, ignoring brackets inside
/// string literals.
fn balanced_spans(raw: &str) -> Vec<&str> {
    let bytes = raw.as_bytes();
    let mut spans = Vec::new();
    let mut stack: Vec<u8> = Vec::new();
    let mut start: Option<usize> = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if !stack.is_empty() => in_string = true,
            b'{' | b'[' => {
                if stack.is_empty() {
                    start = Some(i);
                }
                stack.push(b);
            }
            b'}' | b']' => {
                let expected = if b == b'}' { b'{' } else { b'[' };
                if stack.pop() == Some(expected) {
                    if stack.is_empty() {
                        if let Some(s) = start.take() {
                            spans.push(&raw[s..=i]);
                        }
                    }
                } else {
                    // Mismatched close: discard the current candidate.
                    stack.clear();
                    start = None;
                }
            }
            _ => {}
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: a clean object literal parses directly.
    #[test]
    fn strict_parse_object() {
        assert_eq!(
            parse_structured(r#"{"a": 1}"#),
            Some(json!({"a": 1}))
        );
    }

    /// **Scenario**: an object embedded in prose is extracted.
    #[test]
    fn extracts_object_from_prose() {
        let raw = r#"Sure! Here is the answer: {"a": 2, "b": 5} — hope it helps."#;
        assert_eq!(parse_structured(raw), Some(json!({"a": 2, "b": 5})));
    }

    /// **Scenario**: the largest balanced span wins over smaller ones.
    #[test]
    fn prefers_largest_span() {
        let raw = r#"{"tiny": 1} and then {"bigger": {"nested": [1, 2, 3]}}"#;
        assert_eq!(
            parse_structured(raw),
            Some(json!({"bigger": {"nested": [1, 2, 3]}}))
        );
    }

    /// **Scenario**: braces inside string literals do not break balancing.
    #[test]
    fn braces_inside_strings_ignored() {
        let raw = r#"answer {"text": "set {a} to [b]"} done"#;
        assert_eq!(
            parse_structured(raw),
            Some(json!({"text": "set {a} to [b]"}))
        );
    }

    /// **Scenario**: code-fenced output is extracted.
    #[test]
    fn extracts_from_code_fence() {
        let raw = "```json\n{\"ok\": true}\n```";
        assert_eq!(parse_structured(raw), Some(json!({"ok": true})));
    }

    /// **Scenario**: output with no structured literal yields None.
    #[test]
    fn no_structure_yields_none() {
        assert_eq!(parse_structured("just words, no data"), None);
        assert_eq!(parse_structured("unbalanced { never closed"), None);
    }
}
