//! Message types for generation turns.
//!
//! Roles: System (usually first in the list), User, Assistant, and Tool for
//! tool results fed back into the turn history by the action subtask loop.
//! Used by `GenerationPort::generate` and by `ConversationMemory`.

/// A single turn in the conversation history.
///
/// Roles: system prompt, user input, assistant reply, tool result.
/// Tool turns carry the tool name so the model can attribute results.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Message {
    /// System prompt; typically placed first in the turn list.
    System(String),
    /// User input (e.g. a rendered task template).
    User(String),
    /// Model reply.
    Assistant(String),
    /// Result of one tool invocation, appended by the subtask loop.
    Tool { name: String, content: String },
}

impl Message {
    /// Creates a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System(content.into())
    }

    /// Creates a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User(content.into())
    }

    /// Creates an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant(content.into())
    }

    /// Creates a tool-result turn.
    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Returns the textual content of the turn regardless of role.
    pub fn content(&self) -> &str {
        match self {
            Self::System(c) | Self::User(c) | Self::Assistant(c) => c,
            Self::Tool { content, .. } => content,
        }
    }
}
