//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. `libsql::Connection` is
//! `Send + Sync` and safe for concurrent async use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Connection, Database as LibSqlDatabase};
use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{ChatMessage, Database};
use crate::task::model::{TaskRecord, TaskState};

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 datetime string (our canonical write format).
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn state_to_str(state: TaskState) -> &'static str {
    match state {
        TaskState::Pending => "pending",
        TaskState::Running => "running",
        TaskState::Completed => "completed",
        TaskState::Failed => "failed",
    }
}

fn str_to_state(s: &str) -> TaskState {
    match s {
        "running" => TaskState::Running,
        "completed" => TaskState::Completed,
        "failed" => TaskState::Failed,
        _ => TaskState::Pending,
    }
}

/// Map a libsql row to a TaskRecord.
///
/// Column order: 0:id, 1:external_job_id, 2:prompt, 3:state, 4:result_url,
/// 5:stored_name, 6:created_at, 7:updated_at
fn row_to_task(row: &libsql::Row) -> Result<TaskRecord, libsql::Error> {
    let id_str: String = row.get(0)?;
    let external_job_id: Option<String> = row.get::<String>(1).ok();
    let prompt: String = row.get(2)?;
    let state_str: String = row.get(3)?;
    let result_url: Option<String> = row.get::<String>(4).ok();
    let stored_name: Option<String> = row.get::<String>(5).ok();
    let created_str: String = row.get(6)?;
    let updated_str: String = row.get(7)?;

    Ok(TaskRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        external_job_id,
        prompt,
        state: str_to_state(&state_str),
        result_url,
        stored_name,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

const TASK_COLUMNS: &str =
    "id, external_job_id, prompt, state, result_url, stored_name, created_at, updated_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn put_task(&self, task: &TaskRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO tasks
                    (id, external_job_id, prompt, state, result_url, stored_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    task.id.to_string(),
                    task.external_job_id.clone(),
                    task.prompt.clone(),
                    state_to_str(task.state),
                    task.result_url.clone(),
                    task.stored_name.clone(),
                    task.created_at.to_rfc3339(),
                    task.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_task: {e}")))?;
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<TaskRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_task: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            Some(row) => {
                let task = row_to_task(&row)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT {TASK_COLUMNS} FROM tasks"), ())
            .await
            .map_err(|e| DatabaseError::Query(format!("list_tasks: {e}")))?;

        let mut tasks = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            tasks.push(
                row_to_task(&row).map_err(|e| DatabaseError::Serialization(e.to_string()))?,
            );
        }
        Ok(tasks)
    }

    async fn append_chat_message(&self, role: &str, content: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO chat_messages (id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    Uuid::new_v4().to_string(),
                    role,
                    content,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_chat_message: {e}")))?;
        Ok(())
    }

    async fn list_chat_messages(&self, limit: usize) -> Result<Vec<ChatMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, role, content, created_at FROM chat_messages
                 ORDER BY created_at DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_chat_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            let id_str: String = row
                .get(0)
                .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
            let role: String = row
                .get(1)
                .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
            let content: String = row
                .get(2)
                .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
            let created_str: String = row
                .get(3)
                .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
            messages.push(ChatMessage {
                id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
                role,
                content,
                created_at: parse_datetime(&created_str),
            });
        }
        // Oldest first for display.
        messages.reverse();
        Ok(messages)
    }
}
