//! Async `Database` trait — single interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::task::model::TaskRecord;

/// One line of the durable, ordered conversation log.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Backend-agnostic persistence trait covering tasks and the conversation log.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Tasks ───────────────────────────────────────────────────────

    /// Insert or atomically overwrite a task record.
    async fn put_task(&self, task: &TaskRecord) -> Result<(), DatabaseError>;

    /// Get a task by id.
    async fn get_task(&self, id: Uuid) -> Result<Option<TaskRecord>, DatabaseError>;

    /// All task records. Ordering is unspecified — callers sort explicitly.
    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, DatabaseError>;

    // ── Conversation log ────────────────────────────────────────────

    /// Append a message to the conversation log.
    async fn append_chat_message(&self, role: &str, content: &str) -> Result<(), DatabaseError>;

    /// The last `limit` conversation messages, oldest first.
    async fn list_chat_messages(&self, limit: usize) -> Result<Vec<ChatMessage>, DatabaseError>;
}
