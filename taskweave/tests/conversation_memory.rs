//! Conversation memory through graph runs: load-before, append-after,
//! SQLite persistence.

use std::sync::Arc;

use serde_json::json;
use taskweave::{
    ConversationMemory, FnTool, InMemoryConversationMemory, Message, MockGeneration, RunStatus,
    SqliteConversationMemory, TaskGraph, TaskNode, ToolCall,
};

/// **Scenario**: a memory-attached node appends its user and assistant
/// turns after completion, preserving prior history.
#[tokio::test]
async fn node_appends_turns_after_prior_history() {
    let memory = Arc::new(InMemoryConversationMemory::new());
    memory
        .append(
            "session-1",
            &[Message::user("earlier question"), Message::assistant("earlier answer")],
        )
        .await
        .unwrap();

    let graph = TaskGraph::new(Arc::new(MockGeneration::replying("fresh answer")))
        .with_memory(memory.clone())
        .add_node(TaskNode::new("chat", "new question").with_memory_alias("session-1"))
        .compile()
        .unwrap();
    let report = graph.run("go").await;
    assert_eq!(report.status(), RunStatus::Completed);

    let turns = memory.load("session-1").await.unwrap();
    let contents: Vec<&str> = turns.iter().map(Message::content).collect();
    assert_eq!(
        contents,
        ["earlier question", "earlier answer", "new question", "fresh answer"]
    );
}

/// **Scenario**: tool turns land in the conversation log too.
#[tokio::test]
async fn tool_turns_recorded_in_memory() {
    let memory = Arc::new(InMemoryConversationMemory::new());
    let port = Arc::new(MockGeneration::tool_then_text(
        ToolCall::new("get_time", json!({})),
        "noon",
    ));
    let graph = TaskGraph::new(port)
        .with_memory(memory.clone())
        .add_node(
            TaskNode::new("clock", "time?")
                .with_memory_alias("s")
                .with_tool(Arc::new(FnTool::new("get_time", |_| Ok(json!("12:00"))))),
        )
        .compile()
        .unwrap();
    graph.run("go").await;

    let turns = memory.load("s").await.unwrap();
    assert!(turns
        .iter()
        .any(|t| matches!(t, Message::Tool { name, content } if name == "get_time" && content == "12:00")));
}

/// **Scenario**: a node without an alias leaves memory untouched.
#[tokio::test]
async fn unattached_node_skips_memory() {
    let memory = Arc::new(InMemoryConversationMemory::new());
    let graph = TaskGraph::new(Arc::new(MockGeneration::replying("out")))
        .with_memory(memory.clone())
        .add_node(TaskNode::new("loner", "work"))
        .compile()
        .unwrap();
    graph.run("go").await;
    assert_eq!(memory.alias_count(), 0);
}

/// **Scenario**: the SQLite adapter records a run's turns and serves them
/// back to a later run on the same alias.
#[tokio::test]
async fn sqlite_memory_spans_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conversations.db");
    let memory = Arc::new(SqliteConversationMemory::new(&path).unwrap());

    let first = TaskGraph::new(Arc::new(MockGeneration::replying("first reply")))
        .with_memory(memory.clone())
        .add_node(TaskNode::new("chat", "first question").with_memory_alias("s"))
        .compile()
        .unwrap();
    first.run("go").await;

    let second = TaskGraph::new(Arc::new(MockGeneration::replying("second reply")))
        .with_memory(memory.clone())
        .add_node(TaskNode::new("chat", "second question").with_memory_alias("s"))
        .compile()
        .unwrap();
    second.run("go").await;

    let reopened = SqliteConversationMemory::new(&path).unwrap();
    let turns = reopened.load("s").await.unwrap();
    let contents: Vec<&str> = turns.iter().map(Message::content).collect();
    assert_eq!(
        contents,
        ["first question", "first reply", "second question", "second reply"]
    );
}
