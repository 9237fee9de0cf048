//! Action subtask loop: bounded model ↔ tool round trips within one node.
//!
//! States: AwaitingModel → (ToolRequested → AwaitingModel)* → Final. Each
//! AwaitingModel → ToolRequested transition counts one round trip; a tool
//! request past the node's iteration cap fails the node with
//! `IterationCapExceeded` rather than truncating silently.
//!
//! Tool failures do not propagate from here: the error text is rendered
//! through the configured template into a tool turn so the model can see the
//! failure and choose a different action. Most tool errors are recoverable
//! that way; the cap bounds the ones that are not.

use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::NodeError;
use crate::event::{Event, EventBus};
use crate::generation::{GenerationChunk, GenerationPort, GenerationResponse, ToolCall};
use crate::message::Message;
use crate::template::value_to_text;
use crate::tool::{ToolRegistry, ToolSpec};

/// Per-run options threaded from the node and engine config.
pub(crate) struct SubtaskOptions<'a> {
    pub node_id: &'a str,
    pub iteration_cap: u32,
    pub full_trace: bool,
    pub tool_error_template: &'a str,
    pub chunk_buffer: usize,
}

/// Loop state. `Final` carries the model's answer.
enum LoopState {
    AwaitingModel,
    ToolRequested(Vec<ToolCall>),
    Final(String),
}

/// One generation call with chunk forwarding to the event bus.
///
/// Chunks are forwarded in generation order; the forward loop drains the
/// channel before this returns, so chunk events always precede whatever the
/// caller publishes next.
pub(crate) async fn stream_generation(
    port: &dyn GenerationPort,
    turns: &[Message],
    tools: &[ToolSpec],
    bus: &EventBus,
    node_id: &str,
    chunk_buffer: usize,
) -> Result<GenerationResponse, NodeError> {
    let (chunk_tx, mut chunk_rx) = mpsc::channel(chunk_buffer.max(1));
    let forward = async {
        while let Some(chunk) = chunk_rx.recv().await {
            match chunk {
                GenerationChunk::Text(content) => bus.publish(&Event::TextChunk {
                    node_id: node_id.to_string(),
                    content,
                }),
                GenerationChunk::ToolCallDelta {
                    name,
                    arguments_delta,
                } => bus.publish(&Event::ToolChunk {
                    node_id: node_id.to_string(),
                    tool_name: name,
                    content: arguments_delta,
                }),
            }
        }
    };
    let (response, ()) = tokio::join!(
        port.generate_stream(turns, tools, Some(chunk_tx)),
        forward
    );
    response.map_err(NodeError::Generation)
}

/// Drives the loop to a final answer or a terminal failure.
///
/// Appends assistant and tool turns to `history` as it goes, so the caller
/// can persist them to conversation memory afterwards.
pub(crate) async fn run_subtask_loop(
    port: &dyn GenerationPort,
    tools: &ToolRegistry,
    bus: &EventBus,
    history: &mut Vec<Message>,
    opts: &SubtaskOptions<'_>,
) -> Result<String, NodeError> {
    let specs = tools.specs();
    let mut state = LoopState::AwaitingModel;
    let mut round_trips = 0u32;
    let mut trace_parts: Vec<String> = Vec::new();

    loop {
        state = match state {
            LoopState::AwaitingModel => {
                let response = stream_generation(
                    port,
                    history.as_slice(),
                    &specs,
                    bus,
                    opts.node_id,
                    opts.chunk_buffer,
                )
                .await?;
                if response.is_final() {
                    history.push(Message::assistant(response.content.clone()));
                    LoopState::Final(response.content)
                } else {
                    round_trips += 1;
                    if round_trips > opts.iteration_cap {
                        return Err(NodeError::IterationCapExceeded {
                            cap: opts.iteration_cap,
                        });
                    }
                    if !response.content.is_empty() {
                        history.push(Message::assistant(response.content));
                    }
                    LoopState::ToolRequested(response.tool_calls)
                }
            }
            LoopState::ToolRequested(calls) => {
                for call in &calls {
                    execute_tool_call(call, tools, bus, history, &mut trace_parts, opts).await;
                }
                LoopState::AwaitingModel
            }
            LoopState::Final(text) => {
                debug!(node = %opts.node_id, round_trips, "subtask loop reached final answer");
                return Ok(if opts.full_trace && !trace_parts.is_empty() {
                    trace_parts.push(text);
                    trace_parts.join("\n")
                } else {
                    text
                });
            }
        };
    }
}

/// Runs one requested tool and appends its result turn.
async fn execute_tool_call(
    call: &ToolCall,
    tools: &ToolRegistry,
    bus: &EventBus,
    history: &mut Vec<Message>,
    trace_parts: &mut Vec<String>,
    opts: &SubtaskOptions<'_>,
) {
    debug!(node = %opts.node_id, tool = %call.name, args = ?call.arguments, "calling tool");
    bus.publish(&Event::ToolCallStart {
        node_id: opts.node_id.to_string(),
        tool_name: call.name.clone(),
        call_id: call.id.clone(),
        arguments: call.arguments.clone(),
        at: chrono::Utc::now(),
    });
    let started = Instant::now();

    let (content, result) = match tools.invoke(&call.name, call.arguments.clone()).await {
        Ok(value) => {
            let text = value_to_text(&value);
            trace!(
                node = %opts.node_id,
                tool = %call.name,
                result_len = text.len(),
                result_preview = %truncate(&text, 200),
                "tool returned"
            );
            let preview = truncate(&text, 200);
            (text, Ok(preview))
        }
        Err(e) => {
            warn!(node = %opts.node_id, tool = %call.name, error = %e, "tool call failed");
            let message = opts
                .tool_error_template
                .replace("{tool_name}", &call.name)
                .replace("{error}", &e.to_string());
            (message, Err(e.to_string()))
        }
    };

    bus.publish(&Event::ToolCallFinish {
        node_id: opts.node_id.to_string(),
        tool_name: call.name.clone(),
        call_id: call.id.clone(),
        result,
        at: chrono::Utc::now(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    });
    trace_parts.push(content.clone());
    history.push(Message::tool(&call.name, content));
}

/// Truncates for event previews and logs.
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}
