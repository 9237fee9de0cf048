//! Tool abstraction: a closed interface plus a name-keyed registry.
//!
//! The subtask loop depends on [`ToolRegistry`] instead of concrete tools;
//! new tools implement [`Tool`] and are registered explicitly — there is no
//! reflection or dynamic discovery. [`FnTool`] wraps a closure for tests and
//! small adapters.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Tool description handed to the generation port.
///
/// `argument_shape` is a JSON-schema-style object describing the expected
/// arguments; the engine does not enforce it — tools validate their own
/// input (see [`ToolError::InvalidArguments`]).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolSpec {
    /// Tool name used in invocation requests.
    pub name: String,
    /// Human-readable description for the model.
    pub description: Option<String>,
    /// Declarative shape of the arguments.
    pub argument_shape: Value,
}

/// Errors from invoking a tool.
///
/// These are recoverable at the subtask-loop level: the error text is fed
/// back to the model as a tool turn rather than failing the node.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// No tool with this name is registered.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// The tool rejected its arguments.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The tool started but could not produce a result.
    #[error("tool failed: {0}")]
    Failed(String),
}

/// A callable tool: name, argument shape, invocation.
///
/// Implementations must be safe to call with caller-supplied, unchecked
/// arguments; argument validation is the tool's responsibility.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to request this tool.
    fn name(&self) -> &str;

    /// Description surfaced to the model; `None` omits it.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Declarative argument shape; defaults to an unconstrained object.
    fn argument_shape(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    /// Runs the tool with structured arguments.
    async fn invoke(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// Closure-backed [`Tool`] for tests, examples, and thin adapters.
pub struct FnTool {
    name: String,
    description: Option<String>,
    argument_shape: Value,
    handler: Arc<dyn Fn(Value) -> Result<Value, ToolError> + Send + Sync>,
}

impl FnTool {
    /// Creates a tool from a name and a synchronous handler.
    pub fn new(
        name: impl Into<String>,
        handler: impl Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            argument_shape: serde_json::json!({ "type": "object" }),
            handler: Arc::new(handler),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_argument_shape(mut self, shape: Value) -> Self {
        self.argument_shape = shape;
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn argument_shape(&self) -> Value {
        self.argument_shape.clone()
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
        (self.handler)(arguments)
    }
}

/// Insertion-ordered registry of tools, keyed by name.
///
/// Registering a second tool under an existing name replaces it in place.
/// An empty registry means the owning node runs single-shot generation.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, replacing any existing tool of the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        if let Some(slot) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            *slot = tool;
        } else {
            self.tools.push(tool);
        }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Looks a tool up by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Tool descriptions in registration order, for the generation port.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().map(str::to_string),
                argument_shape: t.argument_shape(),
            })
            .collect()
    }

    /// Invokes a tool by name with structured arguments.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.invoke(arguments).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
