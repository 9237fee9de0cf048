//! Mock generation port for tests and examples.
//!
//! Plays back a scripted sequence of responses; once the script is
//! exhausted, the last entry repeats. Counts calls so tests can assert the
//! repair and iteration bounds. Optional character-by-character streaming
//! for stream-order tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::generation::{
    GenerationChunk, GenerationError, GenerationPort, GenerationResponse, ToolCall,
};
use crate::message::Message;
use crate::tool::ToolSpec;

/// Scripted generation port.
///
/// Each call consumes the next script entry; the last entry repeats when the
/// script runs out, so a mock that always requests tools keeps requesting
/// them past the iteration cap.
pub struct MockGeneration {
    script: Vec<Result<GenerationResponse, GenerationError>>,
    calls: AtomicUsize,
    stream_by_char: bool,
}

impl MockGeneration {
    /// A mock that always replies with the same text.
    pub fn replying(content: impl Into<String>) -> Self {
        Self::from_script(vec![GenerationResponse::text(content)])
    }

    /// A mock that plays the given responses in order, repeating the last.
    pub fn from_script(script: Vec<GenerationResponse>) -> Self {
        Self {
            script: script.into_iter().map(Ok).collect(),
            calls: AtomicUsize::new(0),
            stream_by_char: false,
        }
    }

    /// A mock whose every call fails with a transport error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            script: vec![Err(GenerationError::Transport(message.into()))],
            calls: AtomicUsize::new(0),
            stream_by_char: false,
        }
    }

    /// A mock that first requests one tool call, then replies with text.
    pub fn tool_then_text(call: ToolCall, content: impl Into<String>) -> Self {
        Self::from_script(vec![
            GenerationResponse::tool_requests(vec![call]),
            GenerationResponse::text(content),
        ])
    }

    /// Streams each character of the content as its own chunk.
    pub fn with_stream_by_char(mut self) -> Self {
        self.stream_by_char = true;
        self
    }

    /// Number of generate calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_entry(&self) -> Result<GenerationResponse, GenerationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = n.min(self.script.len().saturating_sub(1));
        match self.script.get(index) {
            Some(entry) => entry.clone(),
            None => Err(GenerationError::Backend("mock script is empty".into())),
        }
    }
}

#[async_trait]
impl GenerationPort for MockGeneration {
    async fn generate(
        &self,
        _turns: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<GenerationResponse, GenerationError> {
        self.next_entry()
    }

    async fn generate_stream(
        &self,
        turns: &[Message],
        tools: &[ToolSpec],
        chunk_tx: Option<mpsc::Sender<GenerationChunk>>,
    ) -> Result<GenerationResponse, GenerationError> {
        let response = self.generate(turns, tools).await?;
        if let Some(tx) = chunk_tx {
            if !response.content.is_empty() {
                if self.stream_by_char {
                    for c in response.content.chars() {
                        let _ = tx.send(GenerationChunk::Text(c.to_string())).await;
                    }
                } else {
                    let _ = tx
                        .send(GenerationChunk::Text(response.content.clone()))
                        .await;
                }
            }
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: script plays in order and repeats the last entry.
    #[tokio::test]
    async fn script_plays_in_order_then_repeats() {
        let mock = MockGeneration::from_script(vec![
            GenerationResponse::text("first"),
            GenerationResponse::text("second"),
        ]);
        assert_eq!(mock.generate(&[], &[]).await.unwrap().content, "first");
        assert_eq!(mock.generate(&[], &[]).await.unwrap().content, "second");
        assert_eq!(mock.generate(&[], &[]).await.unwrap().content, "second");
        assert_eq!(mock.calls(), 3);
    }

    /// **Scenario**: tool_then_text requests the tool first, then answers.
    #[tokio::test]
    async fn tool_then_text_sequence() {
        let mock = MockGeneration::tool_then_text(
            ToolCall::new("get_time", json!({})).with_id("call-1"),
            "The time is as above.",
        );
        let first = mock.generate(&[], &[]).await.unwrap();
        assert_eq!(first.tool_calls.len(), 1);
        assert_eq!(first.tool_calls[0].name, "get_time");
        let second = mock.generate(&[], &[]).await.unwrap();
        assert!(second.is_final());
        assert_eq!(second.content, "The time is as above.");
    }

    /// **Scenario**: failing mock returns a transport error every call.
    #[tokio::test]
    async fn failing_mock_errors() {
        let mock = MockGeneration::failing("socket closed");
        for _ in 0..2 {
            let err = mock.generate(&[], &[]).await.unwrap_err();
            assert!(matches!(err, GenerationError::Transport(m) if m == "socket closed"));
        }
    }

    /// **Scenario**: by-char streaming emits one chunk per character, in
    /// order.
    #[tokio::test]
    async fn stream_by_char_emits_ordered_chunks() {
        let mock = MockGeneration::replying("abc").with_stream_by_char();
        let (tx, mut rx) = mpsc::channel(8);
        let response = mock.generate_stream(&[], &[], Some(tx)).await.unwrap();
        assert_eq!(response.content, "abc");
        let mut seen = String::new();
        while let Ok(GenerationChunk::Text(c)) = rx.try_recv() {
            seen.push_str(&c);
        }
        assert_eq!(seen, "abc");
    }
}
