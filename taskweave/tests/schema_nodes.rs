//! Schema-validated nodes: coercion, the bounded repair cycle, diagnostics.

use std::sync::Arc;

use serde_json::json;
use taskweave::{
    EngineConfig, FieldShape, GenerationResponse, MockGeneration, NodeError, NodeRecord,
    OutputSchema, Predicate, RunStatus, SchemaViolation, Shape, TaskGraph, TaskNode,
};

fn ordered_pair_schema() -> OutputSchema {
    OutputSchema::new(Shape::object(vec![
        FieldShape::required("a", Shape::Integer),
        FieldShape::required("b", Shape::Integer),
    ]))
    .with_predicate(Predicate::new("a < b", |v| {
        if v["a"].as_i64() < v["b"].as_i64() {
            Ok(())
        } else {
            Err("a must be less than b".into())
        }
    }))
}

/// **Scenario**: first answer violates the predicate, the repair turn is
/// appended, the second answer validates; generation runs exactly twice.
#[tokio::test]
async fn repair_cycle_recovers_on_second_attempt() {
    let port = Arc::new(MockGeneration::from_script(vec![
        GenerationResponse::text(r#"{"a": 5, "b": 2}"#),
        GenerationResponse::text(r#"{"a": 2, "b": 5}"#),
    ]));
    let graph = TaskGraph::new(Arc::new(MockGeneration::replying("unused")))
        .add_node(
            TaskNode::new("pair", "produce an ordered pair")
                .with_generation(port.clone())
                .with_output_schema(ordered_pair_schema()),
        )
        .compile()
        .unwrap();

    let report = graph.run("go").await;
    assert_eq!(report.status(), RunStatus::Completed);
    let output = report.output("pair").expect("completed");
    assert_eq!(output.as_structured(), Some(&json!({"a": 2, "b": 5})));
    assert_eq!(port.calls(), 2);
}

/// **Scenario**: repair bound — persistently invalid output fails the node
/// after 1 + repair_attempts generations, keeping the last diagnostic.
#[tokio::test]
async fn repair_bound_then_terminal_violation() {
    let port = Arc::new(MockGeneration::replying(r#"{"a": 9, "b": 1}"#));
    let graph = TaskGraph::new(Arc::new(MockGeneration::replying("unused")))
        .add_node(
            TaskNode::new("pair", "produce an ordered pair")
                .with_generation(port.clone())
                .with_output_schema(ordered_pair_schema()),
        )
        .compile()
        .unwrap();

    let report = graph.run("go").await;
    assert_eq!(report.status(), RunStatus::Failed);
    match report.record("pair") {
        Some(NodeRecord::Failed(NodeError::Schema(SchemaViolation::Invalid(issues)))) => {
            assert!(issues[0].message.contains("a < b"));
        }
        other => panic!("expected schema violation, got {other:?}"),
    }
    assert_eq!(port.calls(), 2, "1 + repair_attempts generations");
}

/// **Scenario**: repair_attempts is configurable; zero attempts means a
/// single generation before the terminal violation.
#[tokio::test]
async fn repair_attempts_configurable_to_zero() {
    let port = Arc::new(MockGeneration::replying("not structured at all"));
    let graph = TaskGraph::new(Arc::new(MockGeneration::replying("unused")))
        .with_config(EngineConfig::default().with_repair_attempts(0))
        .add_node(
            TaskNode::new("strict", "answer")
                .with_generation(port.clone())
                .with_output_schema(ordered_pair_schema()),
        )
        .compile()
        .unwrap();

    let report = graph.run("go").await;
    match report.record("strict") {
        Some(NodeRecord::Failed(NodeError::Schema(SchemaViolation::NotStructured(_)))) => {}
        other => panic!("expected NotStructured, got {other:?}"),
    }
    assert_eq!(port.calls(), 1);
}

/// **Scenario**: a structured answer wrapped in prose is extracted and
/// validated without burning a repair attempt.
#[tokio::test]
async fn embedded_answer_extracted_without_repair() {
    let port = Arc::new(MockGeneration::replying(
        r#"Sure thing! {"a": 1, "b": 3} — anything else?"#,
    ));
    let graph = TaskGraph::new(Arc::new(MockGeneration::replying("unused")))
        .add_node(
            TaskNode::new("pair", "produce an ordered pair")
                .with_generation(port.clone())
                .with_output_schema(ordered_pair_schema()),
        )
        .compile()
        .unwrap();

    let report = graph.run("go").await;
    assert_eq!(report.status(), RunStatus::Completed);
    assert_eq!(port.calls(), 1);
    let output = report.output("pair").expect("completed");
    assert_eq!(output.as_structured(), Some(&json!({"a": 1, "b": 3})));
}

/// **Scenario**: a structured output flows into a dependent's context as a
/// value, addressable by dotted path.
#[tokio::test]
async fn structured_output_feeds_dependent_context() {
    let graph = TaskGraph::new(Arc::new(MockGeneration::replying("unused")))
        .add_node(
            TaskNode::new("classify", "classify the input")
                .with_generation(Arc::new(MockGeneration::replying(
                    r#"{"kind": "text", "confidence": 9}"#,
                )))
                .with_output_schema(OutputSchema::new(Shape::object(vec![
                    FieldShape::required(
                        "kind",
                        Shape::Enumeration(vec![json!("text"), json!("artifact")]),
                    ),
                    FieldShape::required("confidence", Shape::Integer),
                ]))),
        )
        .add_node(
            TaskNode::new("summarize", "the kind was {{classify.kind}}")
                .with_generation(Arc::new(MockGeneration::replying("summarized"))),
        )
        .add_edge("classify", "summarize")
        .compile()
        .unwrap();

    let report = graph.run("go").await;
    assert_eq!(report.status(), RunStatus::Completed);
}
