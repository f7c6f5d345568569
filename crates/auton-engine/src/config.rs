//! Agent configuration loaded from TOML. Absent file or absent keys fall
//! back to defaults; `validate()` runs before an agent is constructed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use auton_core::AgentError;
use auton_core::types::DEFAULT_MAX_ATTEMPTS;

use crate::ledger::RateTable;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model identifier recorded on cost entries ("provider:modelname").
    pub model: String,
    /// Retry budget for tasks that do not override it.
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
    /// Store directory; empty means the platform default state dir.
    pub memory_dir: PathBuf,
    pub executor: ExecutorConfig,
    pub rates: RatesConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "ollama:llama3".to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffConfig::default(),
            memory_dir: PathBuf::new(),
            executor: ExecutorConfig::default(),
            rates: RatesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay after the first failed attempt, in milliseconds.
    pub base_ms: u64,
    /// Ceiling for the exponential schedule, in milliseconds.
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 1000,
            max_ms: 30_000,
        }
    }
}

/// Program the CLI's command executor spawns for each invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: "ollama".to_string(),
            args: vec!["run".to_string(), "llama3".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatesConfig {
    /// Fallback rate per 1000 tokens for models absent from the table.
    pub default_rate: f64,
    pub per_1k_tokens: HashMap<String, f64>,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            default_rate: 0.01,
            per_1k_tokens: HashMap::new(),
        }
    }
}

impl AgentConfig {
    /// Load from a TOML file, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.max_attempts == 0 {
            return Err(AgentError::InvalidConfiguration(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.backoff.base_ms == 0 {
            return Err(AgentError::InvalidConfiguration(
                "backoff.base_ms must be positive".to_string(),
            ));
        }
        if self.backoff.max_ms < self.backoff.base_ms {
            return Err(AgentError::InvalidConfiguration(
                "backoff.max_ms must be >= backoff.base_ms".to_string(),
            ));
        }
        if self.rates.default_rate < 0.0 {
            return Err(AgentError::InvalidConfiguration(
                "rates.default_rate must be non-negative".to_string(),
            ));
        }
        if let Some((model, rate)) = self
            .rates
            .per_1k_tokens
            .iter()
            .find(|(_, rate)| **rate < 0.0)
        {
            return Err(AgentError::InvalidConfiguration(format!(
                "negative rate {rate} for model '{model}'"
            )));
        }
        if self.executor.program.is_empty() {
            return Err(AgentError::InvalidConfiguration(
                "executor.program must not be empty".to_string(),
            ));
        }
        if self.model.is_empty() {
            return Err(AgentError::InvalidConfiguration(
                "model must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.backoff.base_ms),
            Duration::from_millis(self.backoff.max_ms),
        )
    }

    /// Rate table for the cost ledger: built-in defaults overlaid with any
    /// configured per-model rates.
    pub fn rate_table(&self) -> RateTable {
        let mut per_1k_tokens = crate::ledger::builtin_rates();
        per_1k_tokens.extend(self.rates.per_1k_tokens.clone());
        RateTable::new(per_1k_tokens, self.rates.default_rate)
    }
}
