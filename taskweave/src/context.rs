//! Task context: the ordered variable map a node's input template renders
//! against.
//!
//! Populated from static values at node construction and from resolved
//! predecessor outputs just before execution. Insertion order is preserved;
//! re-inserting an existing name replaces the value in place.

use serde_json::Value;

/// Reserved context key holding the graph's initial input.
pub const CTX_INPUT: &str = "input";

/// Reserved context key holding the sole predecessor's output.
///
/// Only present when the node has exactly one predecessor.
pub const CTX_PARENT: &str = "parent";

/// Reserved context key holding all predecessor outputs keyed by node id.
pub const CTX_PARENT_OUTPUTS: &str = "parent_outputs";

/// Ordered mapping of variable name to value.
///
/// Values are `serde_json::Value` so callers can carry strings, numbers, or
/// structured payloads. Lookup is linear; contexts are small by design.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Context {
    entries: Vec<(String, Value)>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing in place if the name already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Looks a value up by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// True when the name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
