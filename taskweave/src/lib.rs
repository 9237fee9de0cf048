//! # Taskweave
//!
//! A DAG task-orchestration engine for generative workflows: each node
//! produces text by invoking a generation capability, optionally augmented
//! with callable tools, and validates its output against a declarative
//! schema with bounded repair.
//!
//! ## Design principles
//!
//! - **Explicit seams**: the model backend sits behind [`GenerationPort`],
//!   tools behind [`Tool`]/[`ToolRegistry`], conversation history behind
//!   [`ConversationMemory`]. No global configuration — everything is passed
//!   into graph construction.
//! - **Build-time validation**: duplicate ids, dangling edges, and cycles
//!   are [`StructuralError`]s from [`TaskGraph::compile`], never run-time
//!   surprises.
//! - **Fail-fast runs**: the first node failure halts scheduling;
//!   dependents are reported as skipped, distinct from their own failures.
//! - **Typed recovery**: tool errors are fed back to the model as turns;
//!   schema violations trigger one bounded repair pass; everything else is
//!   a typed terminal error.
//!
//! ## Main modules
//!
//! - [`graph`]: [`TaskGraph`], [`CompiledTaskGraph`], [`RunReport`] — build
//!   and run task DAGs.
//! - [`node`]: [`TaskNode`], [`TaskOutput`] — the unit of work.
//! - [`generation`]: [`GenerationPort`] trait, [`MockGeneration`].
//! - [`tool`]: [`Tool`], [`FnTool`], [`ToolRegistry`].
//! - [`schema`]: [`OutputSchema`], [`Shape`], [`Predicate`] — structured
//!   output validation with a repair cycle.
//! - [`event`]: [`EventBus`], [`Event`] — in-process pub/sub for lifecycle
//!   and streaming notifications.
//! - [`memory`]: [`ConversationMemory`] with in-memory and SQLite adapters.
//! - [`template`] / [`context`]: `{{ placeholder }}` rendering against the
//!   node's resolved [`Context`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskweave::{MockGeneration, TaskGraph, TaskNode};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let port = Arc::new(MockGeneration::replying("20"));
//! let graph = TaskGraph::new(port)
//!     .add_node(TaskNode::new("double", "double {{x}}").with_context("x", 10))
//!     .compile()
//!     .expect("valid graph");
//!
//! let report = graph.run("start").await;
//! if let Some(output) = report.output("double") {
//!     println!("{output}");
//! }
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod generation;
pub mod graph;
pub mod memory;
pub mod message;
pub mod node;
pub mod schema;
mod subtask;
pub mod template;
pub mod tool;

pub use config::{
    EngineConfig, DEFAULT_ITERATION_CAP, DEFAULT_REPAIR_ATTEMPTS, DEFAULT_TOOL_ERROR_TEMPLATE,
};
pub use context::{Context, CTX_INPUT, CTX_PARENT, CTX_PARENT_OUTPUTS};
pub use error::NodeError;
pub use event::{Event, EventBus, EventFilter, EventKind, SubscriptionId};
pub use generation::{
    GenerationChunk, GenerationError, GenerationPort, GenerationResponse, MockGeneration, ToolCall,
};
pub use graph::{
    CompiledTaskGraph, NodeRecord, RunReport, RunStatus, SkipReason, StructuralError, TaskGraph,
};
pub use memory::{
    ConversationMemory, InMemoryConversationMemory, MemoryError, SqliteConversationMemory,
};
pub use message::Message;
pub use node::{TaskNode, TaskOutput};
pub use schema::{FieldShape, OutputSchema, Predicate, SchemaIssue, SchemaViolation, Shape};
pub use template::TemplateError;
pub use tool::{FnTool, Tool, ToolError, ToolRegistry, ToolSpec};
