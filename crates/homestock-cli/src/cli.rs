//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// HomeStock: a conversational household inventory assistant.
#[derive(Parser)]
#[command(
    name = "homestock",
    version,
    about = "HomeStock: conversational household inventory assistant",
    long_about = "Understands short household requests (\"抽纸消耗1包\", \"从京东导入订单\"), \
                  asks for what is missing and routes them to the inventory, procurement, \
                  finance or notification agent."
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, global = true, env = "HOMESTOCK_CONFIG", default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive conversation.
    Chat {
        /// Resume or create a named conversation.
        #[arg(long, short)]
        session: Option<String>,

        #[arg(long, short, default_value = "local")]
        user: String,
    },

    /// Process a single utterance and print the result as JSON.
    Ask {
        utterance: String,

        #[arg(long, short, default_value = "cli")]
        session: String,

        #[arg(long, short, default_value = "local")]
        user: String,
    },

    /// Execute a workflow definition against the built-in demo agents.
    Workflow {
        /// JSON workflow definition.
        file: PathBuf,

        /// JSON input for the first step.
        #[arg(long, default_value = "{}")]
        input: String,
    },
}
