use crate::types::TaskStatus;

#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("Executor invocation failed: {0}")]
    ExecutorFailure(String),

    #[error("Storage unavailable during {op}: {message}")]
    StorageUnavailable { op: String, message: String },

    #[error("No task with id '{0}'")]
    TaskNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid task transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
}
