//! Executor contract and the command-backed implementation.

use std::process::Stdio;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Output of one executor invocation.
#[derive(Debug, Clone)]
pub struct ExecutorReply {
    pub output: String,
    /// Tokens consumed by the invocation; 0 means unknown or free.
    pub tokens_used: u64,
}

/// The pluggable capability that performs the actual reasoning or tool work
/// for a task or chat turn. Injected at agent construction.
///
/// Any `Err` is treated by the engine as recoverable-by-retry; adapters that
/// need timeouts must impose them per call themselves.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<ExecutorReply>;
}

/// Executor that shells out to a configured program, writing the prompt to
/// stdin and reading the reply from stdout (e.g. `ollama run llama3`).
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn invoke(&self, prompt: &str) -> Result<ExecutorReply> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn executor '{}'", self.program))?;

        let mut stdin = child.stdin.take().context("failed to open executor stdin")?;
        stdin
            .write_all(prompt.as_bytes())
            .await
            .context("failed to write prompt to executor")?;
        // Close stdin so the child sees EOF and can produce its reply.
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("failed to wait for executor")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "executor '{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }

        let reply = String::from_utf8_lossy(&output.stdout)
            .trim_end()
            .to_string();
        let tokens_used = estimate_tokens(prompt) + estimate_tokens(&reply);
        Ok(ExecutorReply {
            output: reply,
            tokens_used,
        })
    }
}

/// Rough whitespace-based token estimate (~1.3 tokens per word). Used when
/// the backing tool reports no usage of its own.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.split_whitespace().count() as f64 * 1.3) as u64
}
