//! Task-execution engine: executor contract, cost ledger, bounded retry, and
//! the agent facade that ties them to the memory store.

pub mod agent;
pub mod config;
pub mod executor;
pub mod ledger;
pub mod retry;

pub use agent::{Agent, AgentStatus};
pub use config::AgentConfig;
pub use executor::{CommandExecutor, Executor, ExecutorReply, estimate_tokens};
pub use ledger::{CostLedger, RateTable};
pub use retry::RetryPolicy;
