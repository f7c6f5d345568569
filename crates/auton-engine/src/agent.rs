//! The agent facade: task execution with bounded retries, one-shot chat, and
//! status aggregation.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use auton_core::AgentError;
use auton_core::types::{Task, TaskOutcome, TaskStatus};
use auton_memory::{MemoryEntry, MemoryKind, MemoryStore, ModelUsage};

use crate::config::AgentConfig;
use crate::executor::Executor;
use crate::ledger::CostLedger;
use crate::retry::RetryPolicy;

/// Number of recent memories folded into each execution prompt.
const CONTEXT_MEMORY_LIMIT: usize = 5;

/// Completion memories keep only a bounded preview of the result, so memory
/// growth stays proportional to task count rather than output size.
const RESULT_PREVIEW_CHARS: usize = 200;

/// Aggregated view returned by [`Agent::status`].
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub model: String,
    pub cost_summary: BTreeMap<String, ModelUsage>,
    pub task_status_counts: BTreeMap<TaskStatus, u64>,
    pub memory_entries: usize,
}

/// The single external contract of the core: execute tasks, chat, report
/// status.
///
/// Constructed explicitly by the composition root and shared by handle; there
/// is no implicit global instance. Task execution is serialized by an
/// internal guard held for the duration of one task, so a shared agent is
/// safe across concurrent callers; `chat` and `status` bypass the guard.
pub struct Agent {
    store: MemoryStore,
    executor: Arc<dyn Executor>,
    ledger: CostLedger,
    retry: RetryPolicy,
    model: String,
    max_attempts: u32,
    exec_guard: Mutex<()>,
}

impl Agent {
    pub fn new(
        config: &AgentConfig,
        store: MemoryStore,
        executor: Arc<dyn Executor>,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        Ok(Self {
            store,
            executor,
            ledger: CostLedger::new(config.rate_table()),
            retry: config.retry_policy(),
            model: config.model.clone(),
            max_attempts: config.max_attempts,
            exec_guard: Mutex::new(()),
        })
    }

    /// Execute a task with the configured retry budget.
    pub async fn execute_task(
        &self,
        description: &str,
        priority: i32,
    ) -> Result<TaskOutcome, AgentError> {
        self.execute_task_with(description, priority, self.max_attempts)
            .await
    }

    /// Execute a task with an explicit retry budget.
    ///
    /// Runs to a terminal state or exhausts retries; there is no mid-flight
    /// cancellation. Executor failures are absorbed by the retry loop and
    /// only surface inside the `Failed` outcome; storage failures abort
    /// immediately, since the bookkeeping itself is compromised.
    pub async fn execute_task_with(
        &self,
        description: &str,
        priority: i32,
        max_attempts: u32,
    ) -> Result<TaskOutcome, AgentError> {
        if max_attempts == 0 {
            return Err(AgentError::InvalidConfiguration(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        let _guard = self.exec_guard.lock().await;

        let mut task = Task::new(description, priority, max_attempts);
        info!(task_id = %task.id, %description, "starting task execution");
        self.persist_task(&task)?;
        self.remember(MemoryEntry::new(
            format!("task_start_{}", task.id),
            MemoryKind::ShortTerm,
            format!("Started task: {description}"),
            "task_execution",
            clamp_importance(priority),
        ))?;

        loop {
            task.begin_attempt()?;
            self.persist_task(&task)?;

            let prompt = self.build_prompt(&task)?;
            match self.executor.invoke(&prompt).await {
                Ok(reply) => {
                    self.ledger
                        .record(
                            &self.store,
                            &self.model,
                            reply.tokens_used,
                            None,
                            Some(&task.id),
                        )
                        .map_err(|error| storage_err("append cost record", &error))?;

                    task.complete(reply.output)?;
                    self.persist_task(&task)?;
                    self.remember(completion_memory(&task))?;
                    info!(task_id = %task.id, attempts = task.attempts, "task completed");
                    return Ok(TaskOutcome::from_task(&task));
                }
                Err(error) => {
                    // Every executor error is recoverable-by-retry; storage
                    // errors never reach this arm.
                    let failure = AgentError::ExecutorFailure(format!("{error:#}"));
                    let message = failure.to_string();
                    warn!(
                        task_id = %task.id,
                        attempt = task.attempts,
                        %message,
                        "executor attempt failed"
                    );

                    if task.attempts_remaining() {
                        self.remember(MemoryEntry::new(
                            format!("retry_{}_{}", task.id, task.attempts),
                            MemoryKind::ShortTerm,
                            format!(
                                "Retry attempt {} for task {}. Error: {}",
                                task.attempts, task.description, message
                            ),
                            "task_retry",
                            6,
                        ))?;
                        task.mark_retrying(message.as_str())?;
                        self.persist_task(&task)?;
                        tokio::time::sleep(self.retry.delay_for(task.attempts)).await;
                    } else {
                        task.fail(message.as_str())?;
                        self.persist_task(&task)?;
                        self.remember(MemoryEntry::new(
                            format!("task_failed_{}", task.id),
                            MemoryKind::LongTerm,
                            format!(
                                "Failed task: {}. Error: {}",
                                task.description, message
                            ),
                            "task_failure",
                            8,
                        ))?;
                        warn!(
                            task_id = %task.id,
                            attempts = task.attempts,
                            "task failed after exhausting retries"
                        );
                        return Ok(TaskOutcome::from_task(&task));
                    }
                }
            }
        }
    }

    /// One-shot chat turn: invokes the executor directly, no task bookkeeping
    /// and no store access. Errors come back as a wrapped reply string.
    pub async fn chat(&self, message: &str) -> String {
        match self.executor.invoke(message).await {
            Ok(reply) => reply.output,
            Err(error) => {
                warn!(error = %format!("{error:#}"), "chat invocation failed");
                format!("Sorry, I encountered an error: {error:#}")
            }
        }
    }

    /// Current cost summary, task status counts, and memory size. Pure read.
    pub fn status(&self) -> Result<AgentStatus, AgentError> {
        Ok(AgentStatus {
            model: self.model.clone(),
            cost_summary: self
                .store
                .cost_summary()
                .map_err(|error| storage_err("read cost summary", &error))?,
            task_status_counts: self
                .store
                .task_status_counts()
                .map_err(|error| storage_err("read task status counts", &error))?,
            memory_entries: self
                .store
                .memory_count()
                .map_err(|error| storage_err("count memory entries", &error))?,
        })
    }

    pub fn get_task(&self, id: &str) -> Result<Task, AgentError> {
        match self.store.get_task(id) {
            Ok(Some(task)) => Ok(task),
            Ok(None) => Err(AgentError::TaskNotFound(id.to_string())),
            Err(error) => Err(storage_err("read task", &error)),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn build_prompt(&self, task: &Task) -> Result<String, AgentError> {
        let memories = self
            .store
            .query(None, CONTEXT_MEMORY_LIMIT)
            .map_err(|error| storage_err("query memory context", &error))?;

        let mut context = String::new();
        for memory in &memories {
            context.push_str("- ");
            context.push_str(&memory.content);
            context.push('\n');
        }

        Ok(format!(
            "TASK: {}\nATTEMPT: {}/{}\n\nRELEVANT MEMORY CONTEXT:\n{}",
            task.description, task.attempts, task.max_attempts, context
        ))
    }

    fn persist_task(&self, task: &Task) -> Result<(), AgentError> {
        self.store
            .put_task(task)
            .map_err(|error| storage_err("persist task", &error))
    }

    fn remember(&self, entry: MemoryEntry) -> Result<(), AgentError> {
        self.store
            .put(&entry)
            .map_err(|error| storage_err("store memory entry", &error))
    }
}

fn storage_err(op: &str, error: &anyhow::Error) -> AgentError {
    AgentError::StorageUnavailable {
        op: op.to_string(),
        message: format!("{error:#}"),
    }
}

fn clamp_importance(priority: i32) -> u8 {
    priority.clamp(1, 10) as u8
}

fn completion_memory(task: &Task) -> MemoryEntry {
    let result = task.result.as_deref().unwrap_or_default();
    let preview: String = result.chars().take(RESULT_PREVIEW_CHARS).collect();
    MemoryEntry::new(
        format!("task_complete_{}", task.id),
        MemoryKind::LongTerm,
        format!("Completed task: {}. Result: {}", task.description, preview),
        "task_completion",
        clamp_importance(task.priority.saturating_add(2)),
    )
}
