//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for command results.
#[derive(Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "auton",
    about = "Autonomous task-execution agent with persistent memory",
    version
)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Path to a TOML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the store directory.
    #[arg(long, global = true)]
    pub memory_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a task through the retry-aware engine.
    Run {
        /// Task description.
        description: String,

        /// Priority 1-10 (metadata only; does not affect execution order).
        #[arg(long, default_value_t = 5)]
        priority: i32,

        /// Override the configured retry budget for this task.
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// One-shot chat without task bookkeeping.
    Chat {
        message: String,
    },

    /// Show cost summary, task status counts, and memory size.
    Status,

    /// Show a stored task by id.
    Task {
        id: String,
    },

    /// Rewrite store logs to their deduplicated snapshots.
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["auton", "run", "do the thing"]).unwrap();
        match cli.command {
            Commands::Run {
                description,
                priority,
                max_attempts,
            } => {
                assert_eq!(description, "do the thing");
                assert_eq!(priority, 5);
                assert!(max_attempts.is_none());
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "auton",
            "status",
            "--format",
            "json",
            "--memory-dir",
            "/tmp/auton-store",
        ])
        .unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
        assert_eq!(
            cli.memory_dir.as_deref(),
            Some(std::path::Path::new("/tmp/auton-store"))
        );
    }
}
