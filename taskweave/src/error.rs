//! Node-level error taxonomy.
//!
//! A `NodeError` fails exactly one node; the graph scheduler decides what it
//! means for the run (fail-fast, dependent skipping). Structural problems
//! are caught at compile time and live in [`crate::graph::StructuralError`];
//! tool errors are recovered inside the subtask loop and only surface here
//! indirectly, through the iteration cap.

use thiserror::Error;

use crate::generation::GenerationError;
use crate::memory::MemoryError;
use crate::schema::SchemaViolation;
use crate::template::TemplateError;

/// Terminal failure of a single task node.
#[derive(Debug, Clone, Error)]
pub enum NodeError {
    /// The generation port could not produce a result; no automatic retry.
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// The subtask loop hit the node's iteration cap without a final answer.
    #[error("iteration cap exceeded after {cap} tool round trips")]
    IterationCapExceeded { cap: u32 },

    /// Structured output failed validation after the allowed repair
    /// attempts. Carries the last validation diagnostic.
    #[error("schema violation: {0}")]
    Schema(SchemaViolation),

    /// The input template referenced something the context cannot resolve.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Conversation memory could not be read or written.
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
}
