//! In-memory conversation log. For dev and tests; not persistent.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::memory::{ConversationMemory, MemoryError};
use crate::message::Message;

/// DashMap-backed conversation log keyed by alias.
///
/// Append is atomic per alias via the map's entry lock; loads clone the
/// current history.
#[derive(Debug, Default)]
pub struct InMemoryConversationMemory {
    log: DashMap<String, Vec<Message>>,
}

impl InMemoryConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of aliases with recorded turns.
    pub fn alias_count(&self) -> usize {
        self.log.len()
    }
}

#[async_trait]
impl ConversationMemory for InMemoryConversationMemory {
    async fn load(&self, alias: &str) -> Result<Vec<Message>, MemoryError> {
        Ok(self
            .log
            .get(alias)
            .map(|turns| turns.clone())
            .unwrap_or_default())
    }

    async fn append(&self, alias: &str, turns: &[Message]) -> Result<(), MemoryError> {
        self.log
            .entry(alias.to_string())
            .or_default()
            .extend(turns.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: loading an unknown alias yields empty history.
    #[tokio::test]
    async fn load_unknown_alias_is_empty() {
        let memory = InMemoryConversationMemory::new();
        assert!(memory.load("nope").await.unwrap().is_empty());
    }

    /// **Scenario**: appends accumulate in order under one alias and are
    /// isolated between aliases.
    #[tokio::test]
    async fn append_accumulates_in_order() {
        let memory = InMemoryConversationMemory::new();
        memory
            .append("s1", &[Message::user("hi"), Message::assistant("hello")])
            .await
            .unwrap();
        memory
            .append("s1", &[Message::user("again")])
            .await
            .unwrap();
        memory.append("s2", &[Message::user("other")]).await.unwrap();

        let turns = memory.load("s1").await.unwrap();
        let contents: Vec<&str> = turns.iter().map(Message::content).collect();
        assert_eq!(contents, ["hi", "hello", "again"]);
        assert_eq!(memory.load("s2").await.unwrap().len(), 1);
        assert_eq!(memory.alias_count(), 2);
    }
}
