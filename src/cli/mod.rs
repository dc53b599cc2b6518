//! CLI entry point for paiprog.

pub mod assistant;
pub mod chat;
pub mod render;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::PaiprogConfig;
use crate::error::Result;
use crate::tools::{builtin, ToolRegistry};

/// Pair-programming assistant for the terminal
#[derive(Parser, Debug)]
#[command(name = "paiprog", version, about = "Pair-programming assistant over the OpenAI Assistants API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chat with the assistant on a fresh thread
    Chat(ChatArgs),
    /// Manage remote assistants
    Assistant(AssistantArgs),
    /// List the tools the assistant can call
    Tools,
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Poll run status instead of streaming events
    #[arg(long)]
    pub poll: bool,

    /// Local assistant name (overrides paiprog.toml)
    #[arg(short, long)]
    pub assistant: Option<String>,

    /// Model to configure the assistant with
    #[arg(short, long)]
    pub model: Option<String>,
}

/// Arguments for the `assistant` subcommand group.
#[derive(Parser, Debug)]
pub struct AssistantArgs {
    #[command(subcommand)]
    pub command: AssistantCommands,
}

#[derive(Subcommand, Debug)]
pub enum AssistantCommands {
    /// Create or update the configured assistant remotely
    Sync,
    /// List remote assistants and the local cache
    List,
    /// Delete a remote assistant
    Delete(DeleteArgs),
}

/// Arguments for `paiprog assistant delete`.
#[derive(Parser, Debug)]
pub struct DeleteArgs {
    /// Remote assistant id (asst_...)
    pub id: String,
}

/// Load layered configuration rooted at the working directory.
pub fn load_config() -> Result<PaiprogConfig> {
    PaiprogConfig::load(&std::env::current_dir()?)
}

/// Built-in tools narrowed to the configured allow-list.
pub fn build_registry(config: &PaiprogConfig) -> Result<Arc<ToolRegistry>> {
    let all = ToolRegistry::new(builtin::all_tools())?;
    let registry = match &config.assistant.tools {
        Some(names) => all.restricted_to(names)?,
        None => all,
    };
    Ok(Arc::new(registry))
}

/// `paiprog tools`
pub fn handle_tools() -> Result<()> {
    let config = load_config()?;
    let registry = build_registry(&config)?;
    for name in registry.names() {
        if let Some(tool) = registry.lookup(name) {
            println!("{name:<16} {}", tool.description());
        }
    }
    Ok(())
}
