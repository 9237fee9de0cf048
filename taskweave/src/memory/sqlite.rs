//! SQLite-backed conversation log. Persistent across process restarts.
//!
//! One row per turn, keyed by (alias, seq). Turns are stored as JSON text.
//! Connections are opened per operation inside `spawn_blocking`, keeping the
//! adapter `Send + Sync` without holding a connection across await points.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::params;

use crate::memory::{ConversationMemory, MemoryError};
use crate::message::Message;

/// SQLite conversation log. Single-node, dev and production.
pub struct SqliteConversationMemory {
    db_path: std::path::PathBuf,
}

impl SqliteConversationMemory {
    /// Opens (or creates) the database and ensures the table exists.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_log (
                alias TEXT NOT NULL,
                seq INTEGER NOT NULL,
                turn TEXT NOT NULL,
                PRIMARY KEY (alias, seq)
            )
            "#,
            [],
        )
        .map_err(|e| MemoryError::Storage(e.to_string()))?;
        Ok(Self { db_path })
    }
}

#[async_trait]
impl ConversationMemory for SqliteConversationMemory {
    async fn load(&self, alias: &str) -> Result<Vec<Message>, MemoryError> {
        let alias = alias.to_string();
        let db_path = self.db_path.clone();

        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare("SELECT turn FROM conversation_log WHERE alias = ?1 ORDER BY seq")
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![alias], |row| row.get::<_, String>(0))
                .map_err(|e| MemoryError::Storage(e.to_string()))?;

            let mut turns = Vec::new();
            for row in rows {
                let text = row.map_err(|e| MemoryError::Storage(e.to_string()))?;
                turns.push(serde_json::from_str::<Message>(&text)?);
            }
            Ok(turns)
        })
        .await
        .map_err(|e| MemoryError::Storage(e.to_string()))?
    }

    async fn append(&self, alias: &str, turns: &[Message]) -> Result<(), MemoryError> {
        if turns.is_empty() {
            return Ok(());
        }
        let alias = alias.to_string();
        let db_path = self.db_path.clone();
        let mut encoded = Vec::with_capacity(turns.len());
        for turn in turns {
            encoded.push(serde_json::to_string(turn)?);
        }

        tokio::task::spawn_blocking(move || {
            let mut conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            let tx = conn
                .transaction()
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            let next_seq: i64 = tx
                .query_row(
                    "SELECT COALESCE(MAX(seq), -1) + 1 FROM conversation_log WHERE alias = ?1",
                    params![alias],
                    |row| row.get(0),
                )
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            for (offset, text) in encoded.iter().enumerate() {
                tx.execute(
                    "INSERT INTO conversation_log (alias, seq, turn) VALUES (?1, ?2, ?3)",
                    params![alias, next_seq + offset as i64, text],
                )
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            }
            tx.commit().map_err(|e| MemoryError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| MemoryError::Storage(e.to_string()))?
    }
}
