pub mod error;
pub mod types;

pub use error::AgentError;
pub use types::{DEFAULT_MAX_ATTEMPTS, DEFAULT_PRIORITY, Task, TaskOutcome, TaskStatus};
