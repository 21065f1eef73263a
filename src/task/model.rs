//! Task record and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TaskError;

/// State of a tracked image-generation task.
///
/// Transitions are monotonic: `Pending -> Running -> {Completed | Failed}`.
/// Nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created locally, remote job id not yet known.
    Pending,
    /// Remote job accepted, polling active.
    Running,
    /// Image generated.
    Completed,
    /// Remote job reported failure.
    Failed,
}

impl TaskState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: TaskState) -> bool {
        use TaskState::*;

        matches!(
            (self, target),
            (Pending, Running) | (Running, Completed) | (Running, Failed)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One tracked image-generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Process-unique identifier, assigned at creation.
    pub id: Uuid,
    /// Identifier returned by the remote job-creation call. Set once.
    pub external_job_id: Option<String>,
    /// The original input text.
    pub prompt: String,
    /// Current state.
    pub state: TaskState,
    /// Result URL; present if and only if the task is `Completed`.
    pub result_url: Option<String>,
    /// Name assigned by durable storage, when enrichment succeeded.
    pub stored_name: Option<String>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// Bumped on every mutation.
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Create a new task in `Pending` state.
    pub fn new(prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_job_id: None,
            prompt: prompt.into(),
            state: TaskState::Pending,
            result_url: None,
            stored_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump `updated_at` without changing state.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn transition_to(&mut self, target: TaskState) -> Result<(), TaskError> {
        if !self.state.can_transition_to(target) {
            return Err(TaskError::InvalidTransition {
                id: self.id,
                state: self.state.to_string(),
                target: target.to_string(),
            });
        }
        self.state = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record the remote job id and advance to `Running`.
    /// The job id is immutable once set.
    pub fn mark_running(&mut self, job_id: impl Into<String>) -> Result<(), TaskError> {
        if self.external_job_id.is_none() {
            self.external_job_id = Some(job_id.into());
        }
        self.transition_to(TaskState::Running)
    }

    /// Terminal success. Sets the result URL and, when enrichment succeeded,
    /// the stored object name.
    pub fn complete(
        &mut self,
        result_url: impl Into<String>,
        stored_name: Option<String>,
    ) -> Result<(), TaskError> {
        self.transition_to(TaskState::Completed)?;
        self.result_url = Some(result_url.into());
        self.stored_name = stored_name;
        Ok(())
    }

    /// Terminal failure reported by the remote job.
    pub fn fail(&mut self) -> Result<(), TaskError> {
        self.transition_to(TaskState::Failed)
    }
}
