use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

mod cli;

use auton_engine::agent::{Agent, AgentStatus};
use auton_engine::config::AgentConfig;
use auton_engine::executor::CommandExecutor;
use auton_memory::MemoryStore;
use cli::{Cli, Commands, OutputFormat};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean for command output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();

    let mut config = AgentConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.memory_dir {
        config.memory_dir = dir;
    }

    let store = MemoryStore::new(config.memory_dir.clone());
    let executor = Arc::new(CommandExecutor::new(
        config.executor.program.clone(),
        config.executor.args.clone(),
    ));
    let agent = Agent::new(&config, store, executor)?;

    match cli.command {
        Commands::Run {
            description,
            priority,
            max_attempts,
        } => {
            let outcome = match max_attempts {
                Some(budget) => {
                    agent
                        .execute_task_with(&description, priority, budget)
                        .await?
                }
                None => agent.execute_task(&description, priority).await?,
            };

            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
                OutputFormat::Text => {
                    println!("task:     {}", outcome.task_id);
                    println!("status:   {}", outcome.status);
                    println!("attempts: {}", outcome.attempts);
                    if let Some(result) = &outcome.result {
                        println!("result:\n{result}");
                    }
                    if let Some(error) = &outcome.error {
                        println!("error:    {error}");
                    }
                }
            }
        }

        Commands::Chat { message } => {
            println!("{}", agent.chat(&message).await);
        }

        Commands::Status => {
            let status = agent.status()?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
                OutputFormat::Text => print_status_text(&status),
            }
        }

        Commands::Task { id } => {
            let task = agent.get_task(&id)?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&task)?),
                OutputFormat::Text => {
                    println!("task:        {}", task.id);
                    println!("description: {}", task.description);
                    println!("status:      {}", task.status);
                    println!("priority:    {}", task.priority);
                    println!("attempts:    {}/{}", task.attempts, task.max_attempts);
                    if let Some(result) = &task.result {
                        println!("result:\n{result}");
                    }
                    if let Some(error) = &task.error {
                        println!("error:       {error}");
                    }
                }
            }
        }

        Commands::Compact => {
            agent.store().compact()?;
            println!("store compacted: {}", agent.store().base_dir().display());
        }
    }

    Ok(())
}

fn print_status_text(status: &AgentStatus) {
    println!("model: {}", status.model);
    println!("memory entries: {}", status.memory_entries);

    println!("tasks:");
    if status.task_status_counts.is_empty() {
        println!("  (none)");
    }
    for (task_status, count) in &status.task_status_counts {
        println!("  {task_status}: {count}");
    }

    println!("costs:");
    if status.cost_summary.is_empty() {
        println!("  (none)");
    }
    for (model, usage) in &status.cost_summary {
        println!(
            "  {model}: {} tokens, ${:.4} over {} calls",
            usage.total_tokens, usage.total_cost, usage.call_count
        );
    }
}
