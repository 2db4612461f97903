//! CLI entry point for HomeStock.
//!
//! Provides the `homestock` command: an interactive `chat`, a one-shot
//! `ask` that prints the turn result as JSON, and `workflow` for running a
//! workflow definition against the demo agents.

mod agents;
mod cli;

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use homestock_agent::{ConversationManager, HomeStockConfig, WorkflowDefinition, WorkflowExecutor};

use crate::cli::{Cli, Commands};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "info" });

    let config = HomeStockConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    match cli.command {
        Commands::Chat { session, user } => cmd_chat(&config, session, &user).await,
        Commands::Ask {
            utterance,
            session,
            user,
        } => cmd_ask(&config, &utterance, &session, &user).await,
        Commands::Workflow { file, input } => cmd_workflow(&config, &file, &input).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: chat
// ---------------------------------------------------------------------------

async fn cmd_chat(config: &HomeStockConfig, session: Option<String>, user: &str) -> Result<()> {
    let store = config.open_store().await.context("failed to open state store")?;
    let manager = ConversationManager::new(config, store).context("failed to build pipeline")?;
    let conversation_id = session.unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
    info!(conversation_id = %conversation_id, "chat session started");

    println!();
    println!("  HomeStock v{}", env!("CARGO_PKG_VERSION"));
    println!("  Conversation: {conversation_id}");
    println!("  Type a request, or 'quit' to exit.");
    println!();

    let stdin = io::stdin();
    prompt()?;
    for line in stdin.lock().lines() {
        let line = line.context("failed to read input")?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            prompt()?;
            continue;
        }
        if trimmed == "quit" || trimmed == "exit" {
            info!("user requested exit");
            break;
        }

        let result = manager.process(trimmed, &conversation_id, user).await;
        println!("  {}", result.response);
        if let Some(request) = &result.clarification {
            if !request.suggested_responses.is_empty() {
                println!("  例如: {}", request.suggested_responses.join(" / "));
            }
            println!("  ({}/{})", request.attempts, request.max_attempts);
        } else if let Some(routing) = &result.routing {
            println!(
                "  [{} {:.2}] {}",
                routing.target_agent, routing.confidence, routing.reasoning
            );
        }
        if let Some(err) = &result.error {
            println!("  error: {err}");
        }
        println!();
        prompt()?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: ask
// ---------------------------------------------------------------------------

async fn cmd_ask(config: &HomeStockConfig, utterance: &str, session: &str, user: &str) -> Result<()> {
    let store = config.open_store().await.context("failed to open state store")?;
    let manager = ConversationManager::new(config, store).context("failed to build pipeline")?;

    let result = manager.process(utterance, session, user).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: workflow
// ---------------------------------------------------------------------------

async fn cmd_workflow(config: &HomeStockConfig, file: &std::path::Path, input: &str) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let definition = WorkflowDefinition::from_json(&json).context("invalid workflow definition")?;
    let input: serde_json::Value = serde_json::from_str(input).context("--input is not valid JSON")?;

    let store = config.open_store().await.context("failed to open state store")?;
    let executor = WorkflowExecutor::new(agents::demo_registry(), store, config.executor_config());

    let state = executor.execute(&definition, input).await?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn prompt() -> Result<()> {
    print!("> ");
    io::stdout().flush().context("failed to flush stdout")
}

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}
