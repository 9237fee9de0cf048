//! Generation port: the external text-generation capability seam.
//!
//! The engine depends on [`GenerationPort`] instead of any provider API.
//! Given an ordered turn list (and optionally tool descriptors), an
//! implementation returns plain text or tool-invocation requests.
//!
//! # Streaming
//!
//! `generate_stream()` accepts an optional `Sender<GenerationChunk>` for
//! emitting incremental text and tool-call deltas before the final result.
//! The default implementation calls `generate()` and forwards the full
//! content as one chunk, so non-streaming backends need no extra code.

mod mock;

pub use mock::MockGeneration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::message::Message;
use crate::tool::ToolSpec;

/// Generation failure: the port could not produce a result.
///
/// Surfaced as an immediate node failure; the engine performs no transport
/// retry at this layer.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// The backend was unreachable or the connection dropped.
    #[error("transport error: {0}")]
    Transport(String),
    /// The backend answered but the response was unusable.
    #[error("backend error: {0}")]
    Backend(String),
}

/// One tool-invocation request from the model.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolCall {
    /// Registered tool name.
    pub name: String,
    /// Structured arguments as produced by the model.
    pub arguments: Value,
    /// Provider-assigned call id, when available.
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Response from one generation call: assistant text and any tool requests.
///
/// Empty `tool_calls` means the model produced a final answer.
#[derive(Debug, Clone, Default)]
pub struct GenerationResponse {
    /// Assistant message content.
    pub content: String,
    /// Tool-invocation requests, in the order the model listed them.
    pub tool_calls: Vec<ToolCall>,
}

impl GenerationResponse {
    /// A plain-text response (final answer).
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// A response requesting tool invocations.
    pub fn tool_requests(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
        }
    }

    /// True when no tools were requested.
    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

/// One incremental piece of a streamed generation.
#[derive(Debug, Clone)]
pub enum GenerationChunk {
    /// Partial assistant text, in generation order.
    Text(String),
    /// Partial tool-call arguments, in generation order.
    ToolCallDelta {
        name: Option<String>,
        arguments_delta: String,
    },
}

/// The generation capability: turns in, text or tool requests out.
///
/// Implementations wrap a concrete model backend; [`MockGeneration`] scripts
/// responses for tests and examples.
#[async_trait]
pub trait GenerationPort: Send + Sync {
    /// One generation call over the full turn history.
    async fn generate(
        &self,
        turns: &[Message],
        tools: &[ToolSpec],
    ) -> Result<GenerationResponse, GenerationError>;

    /// Streaming variant: when `chunk_tx` is `Some`, implementations send
    /// [`GenerationChunk`]s as they arrive and still return the complete
    /// response at the end.
    async fn generate_stream(
        &self,
        turns: &[Message],
        tools: &[ToolSpec],
        chunk_tx: Option<mpsc::Sender<GenerationChunk>>,
    ) -> Result<GenerationResponse, GenerationError> {
        let response = self.generate(turns, tools).await?;
        if let Some(tx) = chunk_tx {
            if !response.content.is_empty() {
                let _ = tx.send(GenerationChunk::Text(response.content.clone())).await;
            }
        }
        Ok(response)
    }
}
