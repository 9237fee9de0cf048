//! Tool-augmented task: the model requests a tool, reads its result, and
//! answers; lifecycle events stream to stdout via the event bus.
//!
//! Run: `cargo run -p taskweave-examples --example tool_loop`

use std::sync::Arc;

use serde_json::json;
use taskweave::{
    Event, EventBus, EventFilter, FnTool, MockGeneration, TaskGraph, TaskNode, ToolCall,
};

#[tokio::main]
async fn main() {
    let bus = Arc::new(EventBus::new());
    bus.subscribe(EventFilter::All, |event: &Event| {
        match event {
            Event::NodeStart { node_id } => println!("[{node_id}] started"),
            Event::ToolCallStart { node_id, tool_name, .. } => {
                println!("[{node_id}] calling {tool_name}")
            }
            Event::ToolCallFinish { node_id, tool_name, result, elapsed_ms, .. } => {
                println!("[{node_id}] {tool_name} -> {result:?} ({elapsed_ms} ms)")
            }
            Event::NodeFinish { node_id, result } => println!("[{node_id}] finished: {result:?}"),
            _ => {}
        }
        Ok(())
    });

    let port = Arc::new(MockGeneration::tool_then_text(
        ToolCall::new("get_time", json!({})).with_id("call-1"),
        "The current time is 12:00.",
    ));
    let clock = Arc::new(
        FnTool::new("get_time", |_args| Ok(json!("12:00")))
            .with_description("Returns the current wall-clock time"),
    );

    let graph = TaskGraph::new(port)
        .with_event_bus(bus)
        .add_node(
            TaskNode::new("clock", "What time is it?")
                .with_tool(clock)
                .with_iteration_cap(5),
        )
        .compile()
        .expect("valid graph");

    let report = graph.run("").await;
    if let Some(output) = report.output("clock") {
        println!("answer: {output}");
    }
}
