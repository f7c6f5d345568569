//! Task records and the lifecycle state machine that governs them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::AgentError;

/// Retry budget applied to tasks that do not override it.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Mid-range priority used when the caller does not supply one.
pub const DEFAULT_PRIORITY: i32 = 5;

/// Lifecycle status of a task. `Completed` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Retrying,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of agent work with a tracked lifecycle and bounded retry budget.
///
/// Only the execution engine mutates a task, and only through the transition
/// methods below; a terminal task is never reused for a new attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    /// Caller-supplied metadata; does not affect execution order.
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    /// Reserved for future decomposition; the engine never populates this.
    #[serde(default)]
    pub subtasks: Vec<String>,
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// Allocate a fresh `Pending` task with a time-ordered collision-free id.
    pub fn new(description: impl Into<String>, priority: i32, max_attempts: u32) -> Self {
        Self {
            id: format!("task_{}", Ulid::new()),
            description: description.into(),
            status: TaskStatus::Pending,
            priority,
            created_at: Utc::now(),
            subtasks: Vec::new(),
            attempts: 0,
            max_attempts,
            result: None,
            error: None,
        }
    }

    /// `Pending|Retrying -> InProgress`, consuming one attempt from the budget.
    pub fn begin_attempt(&mut self) -> Result<(), AgentError> {
        match self.status {
            TaskStatus::Pending | TaskStatus::Retrying if self.attempts < self.max_attempts => {
                self.status = TaskStatus::InProgress;
                self.attempts += 1;
                Ok(())
            }
            from => Err(AgentError::InvalidTransition {
                from,
                to: TaskStatus::InProgress,
            }),
        }
    }

    /// `InProgress -> Completed`. Sets `result`, clears any retry-era `error`.
    pub fn complete(&mut self, result: impl Into<String>) -> Result<(), AgentError> {
        match self.status {
            TaskStatus::InProgress => {
                self.status = TaskStatus::Completed;
                self.result = Some(result.into());
                self.error = None;
                Ok(())
            }
            from => Err(AgentError::InvalidTransition {
                from,
                to: TaskStatus::Completed,
            }),
        }
    }

    /// `InProgress -> Retrying`, only while attempts remain in the budget.
    pub fn mark_retrying(&mut self, error: impl Into<String>) -> Result<(), AgentError> {
        match self.status {
            TaskStatus::InProgress if self.attempts < self.max_attempts => {
                self.status = TaskStatus::Retrying;
                self.error = Some(error.into());
                Ok(())
            }
            from => Err(AgentError::InvalidTransition {
                from,
                to: TaskStatus::Retrying,
            }),
        }
    }

    /// `InProgress -> Failed` (terminal). Sets `error`, clears `result`.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), AgentError> {
        match self.status {
            TaskStatus::InProgress => {
                self.status = TaskStatus::Failed;
                self.error = Some(error.into());
                self.result = None;
                Ok(())
            }
            from => Err(AgentError::InvalidTransition {
                from,
                to: TaskStatus::Failed,
            }),
        }
    }

    pub fn attempts_remaining(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Final synchronous result of one `execute_task` call.
///
/// `Completed` carries `result`; `Failed` (retries exhausted) carries the last
/// `error`. Infrastructure faults never appear here; they surface as
/// [`AgentError`] instead.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

impl TaskOutcome {
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            status: task.status,
            result: task.result.clone(),
            error: task.error.clone(),
            attempts: task.attempts,
        }
    }
}
