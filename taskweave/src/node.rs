//! Task node: the unit of work in the orchestration graph.
//!
//! A node renders its input template against its resolved context, drives
//! either a single generation call or the action subtask loop, optionally
//! validates the result against an output schema (with a bounded repair
//! cycle), and produces exactly one immutable output.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::NodeError;
use crate::event::EventBus;
use crate::generation::GenerationPort;
use crate::memory::ConversationMemory;
use crate::message::Message;
use crate::schema::OutputSchema;
use crate::subtask::{self, SubtaskOptions};
use crate::template;
use crate::tool::{Tool, ToolRegistry};

/// A node's output: plain text, or a schema-validated structured value.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TaskOutput {
    Text(String),
    Structured(Value),
}

impl TaskOutput {
    /// Textual form: text as-is, structured values as compact JSON.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Structured(v) => v.to_string(),
        }
    }

    /// Context-value form: text becomes a JSON string, structured values
    /// pass through.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Structured(v) => v.clone(),
        }
    }

    /// The structured value, when the node declared an output schema.
    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Self::Structured(v) => Some(v),
            Self::Text(_) => None,
        }
    }
}

impl std::fmt::Display for TaskOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

/// One task node: input template, optional tools, optional output schema.
///
/// Constructed at graph-build time; execution state lives in the scheduler,
/// not here. Ids must be unique within a graph.
pub struct TaskNode {
    id: String,
    input_template: String,
    context: Context,
    tools: ToolRegistry,
    output_schema: Option<OutputSchema>,
    iteration_cap: Option<u32>,
    memory_alias: Option<String>,
    generation: Option<Arc<dyn GenerationPort>>,
    full_trace: bool,
}

impl TaskNode {
    /// Creates a node with the given id and input template.
    pub fn new(id: impl Into<String>, input_template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input_template: input_template.into(),
            context: Context::new(),
            tools: ToolRegistry::new(),
            output_schema: None,
            iteration_cap: None,
            memory_alias: None,
            generation: None,
            full_trace: false,
        }
    }

    /// Adds one static context value.
    pub fn with_context(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(name, value);
        self
    }

    /// Replaces the whole static context.
    pub fn with_static_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Attaches a tool set; a non-empty set switches the node to the
    /// action subtask loop.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Registers a single tool.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    /// Declares the output schema the final result must satisfy.
    pub fn with_output_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Overrides the engine-default iteration cap for this node.
    pub fn with_iteration_cap(mut self, cap: u32) -> Self {
        self.iteration_cap = Some(cap);
        self
    }

    /// Attaches the node to a conversation-memory alias.
    pub fn with_memory_alias(mut self, alias: impl Into<String>) -> Self {
        self.memory_alias = Some(alias.into());
        self
    }

    /// Overrides the graph's generation port for this node.
    pub fn with_generation(mut self, port: Arc<dyn GenerationPort>) -> Self {
        self.generation = Some(port);
        self
    }

    /// Includes intermediate tool outputs in the raw output.
    pub fn with_full_trace(mut self, full_trace: bool) -> Self {
        self.full_trace = full_trace;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn input_template(&self) -> &str {
        &self.input_template
    }

    pub fn static_context(&self) -> &Context {
        &self.context
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn output_schema(&self) -> Option<&OutputSchema> {
        self.output_schema.as_ref()
    }

    pub fn iteration_cap(&self) -> Option<u32> {
        self.iteration_cap
    }

    pub fn memory_alias(&self) -> Option<&str> {
        self.memory_alias.as_deref()
    }

    pub(crate) fn generation_override(&self) -> Option<&Arc<dyn GenerationPort>> {
        self.generation.as_ref()
    }
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("input_template", &self.input_template)
            .field("tools", &self.tools)
            .field("has_schema", &self.output_schema.is_some())
            .field("iteration_cap", &self.iteration_cap)
            .field("memory_alias", &self.memory_alias)
            .finish()
    }
}

/// Shared collaborators a node needs at execution time.
pub(crate) struct NodeServices {
    pub generation: Arc<dyn GenerationPort>,
    pub bus: Arc<EventBus>,
    pub memory: Option<Arc<dyn ConversationMemory>>,
    pub config: EngineConfig,
}

/// Executes one node against its resolved context.
///
/// The repair cycle re-drives the generation (single-shot or subtask loop)
/// at most `config.repair_attempts` extra times, each time appending a user
/// turn describing the exact validation failure. Memory turns are appended
/// only when the node completes.
pub(crate) async fn execute_node(
    node: &TaskNode,
    resolved: &Context,
    services: &NodeServices,
) -> Result<TaskOutput, NodeError> {
    let port: &dyn GenerationPort = match node.generation_override() {
        Some(p) => p.as_ref(),
        None => services.generation.as_ref(),
    };
    let cap = node
        .iteration_cap
        .unwrap_or(services.config.default_iteration_cap);

    let prior = match (&node.memory_alias, &services.memory) {
        (Some(alias), Some(memory)) => memory.load(alias).await?,
        _ => Vec::new(),
    };
    let rendered = template::render(&node.input_template, resolved)?;
    debug!(node = %node.id, input_len = rendered.len(), "node input rendered");

    let prior_len = prior.len();
    let mut history = prior;
    history.push(Message::user(rendered));

    let mut attempts_left = services.config.repair_attempts;
    let output = loop {
        let raw = if node.tools.is_empty() {
            let response = subtask::stream_generation(
                port,
                &history,
                &[],
                &services.bus,
                &node.id,
                services.config.chunk_buffer,
            )
            .await?;
            history.push(Message::assistant(response.content.clone()));
            response.content
        } else {
            let opts = SubtaskOptions {
                node_id: &node.id,
                iteration_cap: cap,
                full_trace: node.full_trace,
                tool_error_template: &services.config.tool_error_template,
                chunk_buffer: services.config.chunk_buffer,
            };
            subtask::run_subtask_loop(port, &node.tools, &services.bus, &mut history, &opts)
                .await?
        };

        let Some(schema) = &node.output_schema else {
            break TaskOutput::Text(raw);
        };
        match schema.coerce(&raw) {
            Ok(value) => break TaskOutput::Structured(value),
            Err(violation) if attempts_left > 0 => {
                attempts_left -= 1;
                warn!(node = %node.id, error = %violation, "structured output invalid, repairing");
                history.push(Message::user(repair_turn(&violation)));
            }
            Err(violation) => return Err(NodeError::Schema(violation)),
        }
    };

    if let (Some(alias), Some(memory)) = (&node.memory_alias, &services.memory) {
        memory.append(alias, &history[prior_len..]).await?;
    }
    Ok(output)
}

/// The user turn asking for a corrected structured answer.
fn repair_turn(violation: &crate::schema::SchemaViolation) -> String {
    format!(
        "Your previous answer did not satisfy the required output shape.\n\
         {violation}\n\
         Reply again with only the corrected structured answer."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationResponse, MockGeneration};
    use crate::memory::InMemoryConversationMemory;
    use crate::schema::{FieldShape, OutputSchema, Predicate, Shape};
    use serde_json::json;

    fn services(port: Arc<dyn GenerationPort>) -> NodeServices {
        NodeServices {
            generation: port,
            bus: Arc::new(EventBus::new()),
            memory: None,
            config: EngineConfig::default(),
        }
    }

    /// **Scenario**: single-shot node renders its template and returns the
    /// mock's text.
    #[tokio::test]
    async fn single_shot_renders_and_generates() {
        let mock = Arc::new(MockGeneration::replying("20"));
        let node = TaskNode::new("double", "double {{x}}").with_context("x", json!(10));
        let resolved = node.static_context().clone();
        let output = execute_node(&node, &resolved, &services(mock)).await.unwrap();
        assert_eq!(output, TaskOutput::Text("20".into()));
    }

    /// **Scenario**: a hard generation failure surfaces as a node failure
    /// with no retry.
    #[tokio::test]
    async fn generation_failure_is_terminal() {
        let mock = Arc::new(MockGeneration::failing("connection reset"));
        let node = TaskNode::new("n", "hello");
        let err = execute_node(&node, &Context::new(), &services(mock.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Generation(_)));
        assert_eq!(mock.calls(), 1, "no transport retry at this layer");
    }

    /// **Scenario**: schema repair — first answer violates the predicate,
    /// the repair turn is appended, the second answer passes; the port is
    /// invoked exactly twice.
    #[tokio::test]
    async fn schema_repair_second_attempt_passes() {
        let mock = Arc::new(MockGeneration::from_script(vec![
            GenerationResponse::text(r#"{"a": 5, "b": 2}"#),
            GenerationResponse::text(r#"{"a": 2, "b": 5}"#),
        ]));
        let schema = OutputSchema::new(Shape::object(vec![
            FieldShape::required("a", Shape::Integer),
            FieldShape::required("b", Shape::Integer),
        ]))
        .with_predicate(Predicate::new("a < b", |v| {
            if v["a"].as_i64() < v["b"].as_i64() {
                Ok(())
            } else {
                Err("a must be less than b".into())
            }
        }));
        let node = TaskNode::new("pair", "produce the pair").with_output_schema(schema);
        let output = execute_node(&node, &Context::new(), &services(mock.clone()))
            .await
            .unwrap();
        assert_eq!(output.as_structured(), Some(&json!({"a": 2, "b": 5})));
        assert_eq!(mock.calls(), 2);
    }

    /// **Scenario**: repair bound — with repair_attempts=1 and persistently
    /// bad output, generation runs exactly twice and the node fails with the
    /// last diagnostic.
    #[tokio::test]
    async fn schema_repair_bound_is_enforced() {
        let mock = Arc::new(MockGeneration::replying("still not structured"));
        let schema = OutputSchema::new(Shape::object(vec![FieldShape::required(
            "a",
            Shape::Integer,
        )]));
        let node = TaskNode::new("pair", "produce the pair").with_output_schema(schema);
        let err = execute_node(&node, &Context::new(), &services(mock.clone()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NodeError::Schema(crate::schema::SchemaViolation::NotStructured(_))
        ));
        assert_eq!(mock.calls(), 2, "1 + repair_attempts generations");
    }

    /// **Scenario**: unknown template placeholder fails the node before any
    /// generation.
    #[tokio::test]
    async fn template_error_fails_before_generation() {
        let mock = Arc::new(MockGeneration::replying("unused"));
        let node = TaskNode::new("n", "value: {{missing}}");
        let err = execute_node(&node, &Context::new(), &services(mock.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Template(_)));
        assert_eq!(mock.calls(), 0);
    }

    /// **Scenario**: a memory-attached node loads prior turns and appends
    /// its new turns after completion.
    #[tokio::test]
    async fn memory_loaded_and_appended() {
        let memory = Arc::new(InMemoryConversationMemory::new());
        memory
            .append("s1", &[Message::user("earlier"), Message::assistant("noted")])
            .await
            .unwrap();

        let mock = Arc::new(MockGeneration::replying("reply"));
        let node = TaskNode::new("chat", "say hi").with_memory_alias("s1");
        let mut services = services(mock);
        let shared: Arc<dyn ConversationMemory> = memory.clone();
        services.memory = Some(shared);

        execute_node(&node, &Context::new(), &services).await.unwrap();

        let turns = memory.load("s1").await.unwrap();
        let contents: Vec<&str> = turns.iter().map(Message::content).collect();
        assert_eq!(contents, ["earlier", "noted", "say hi", "reply"]);
    }

    /// **Scenario**: output accessors expose text and structured forms.
    #[test]
    fn task_output_accessors() {
        let text = TaskOutput::Text("plain".into());
        assert_eq!(text.as_text(), "plain");
        assert_eq!(text.to_value(), json!("plain"));
        assert!(text.as_structured().is_none());

        let structured = TaskOutput::Structured(json!({"k": 1}));
        assert_eq!(structured.as_text(), r#"{"k":1}"#);
        assert_eq!(structured.to_value(), json!({"k": 1}));
        assert_eq!(structured.to_string(), r#"{"k":1}"#);
    }
}
