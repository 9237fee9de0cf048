//! Schema-validated task with the bounded repair cycle.
//!
//! The mock's first answer violates the cross-field predicate; the engine
//! appends a repair turn describing the violation and the second answer
//! passes.
//!
//! Run: `cargo run -p taskweave-examples --example structured_output`

use std::sync::Arc;

use taskweave::{
    FieldShape, GenerationResponse, MockGeneration, OutputSchema, Predicate, Shape, TaskGraph,
    TaskNode,
};

#[tokio::main]
async fn main() {
    let schema = OutputSchema::new(Shape::object(vec![
        FieldShape::required("a", Shape::Integer),
        FieldShape::required("b", Shape::Integer),
    ]))
    .with_predicate(Predicate::new("a < b", |value| {
        if value["a"].as_i64() < value["b"].as_i64() {
            Ok(())
        } else {
            Err("a must be less than b".to_string())
        }
    }));

    let port = Arc::new(MockGeneration::from_script(vec![
        GenerationResponse::text(r#"{"a": 5, "b": 2}"#),
        GenerationResponse::text(r#"{"a": 2, "b": 5}"#),
    ]));

    let graph = TaskGraph::new(port.clone())
        .add_node(
            TaskNode::new("pair", "Produce a JSON object with integers a < b")
                .with_output_schema(schema),
        )
        .compile()
        .expect("valid graph");

    let report = graph.run("").await;
    match report.output("pair") {
        Some(output) => println!(
            "validated after {} generation calls: {output}",
            port.calls()
        ),
        None => eprintln!("failed: {:?}", report.first_failure()),
    }
}
