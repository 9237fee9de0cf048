//! Conversation memory: an external keyed append log of turns.
//!
//! A node attached to memory loads prior turns before rendering its input
//! and appends its own new turns (including tool turns) after completion.
//! The alias is an opaque string chosen by the caller (e.g. a session id).
//! No compaction or summarization lives here.

mod in_memory;
mod sqlite;

pub use in_memory::InMemoryConversationMemory;
pub use sqlite::SqliteConversationMemory;

use async_trait::async_trait;
use thiserror::Error;

use crate::message::Message;

/// Errors from loading or appending conversation turns.
#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(String),
    /// A stored turn could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for MemoryError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Keyed append-only log of conversation turns.
///
/// Entries are appended, never mutated in place. Loading an unknown alias
/// yields an empty history, not an error.
#[async_trait]
pub trait ConversationMemory: Send + Sync {
    /// Returns all turns recorded under the alias, oldest first.
    async fn load(&self, alias: &str) -> Result<Vec<Message>, MemoryError>;

    /// Appends turns to the alias, preserving order.
    async fn append(&self, alias: &str, turns: &[Message]) -> Result<(), MemoryError>;
}
