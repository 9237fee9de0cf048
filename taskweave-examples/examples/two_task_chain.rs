//! Two-task chain: the second task consumes the first task's output.
//!
//! Run: `cargo run -p taskweave-examples --example two_task_chain -- 10`
//!
//! Uses the scripted mock port so the example runs offline; swap in a real
//! `GenerationPort` implementation to drive an actual model.

use std::sync::Arc;

use taskweave::{GenerationResponse, MockGeneration, TaskGraph, TaskNode};

#[tokio::main]
async fn main() {
    let input = std::env::args().nth(1).unwrap_or_else(|| "10".to_string());

    let port = Arc::new(MockGeneration::from_script(vec![
        GenerationResponse::text("20"),
        GenerationResponse::text("80"),
    ]));

    let graph = TaskGraph::new(port)
        .add_node(TaskNode::new("double", "Double this number: {{input}}"))
        .add_node(TaskNode::new("quadruple", "Multiply by 4: {{parent}}"))
        .add_edge("double", "quadruple")
        .compile()
        .expect("valid graph");

    let report = graph.run(input).await;
    for (id, output) in report.outputs() {
        println!("task {id}: {output}");
    }
}
