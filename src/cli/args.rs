//! Command line arguments

use std::path::PathBuf;

use agentloom_core::{ChatMode, Settings};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "agentloom")]
#[command(version, about = "Tool-calling chat, planning and plan execution against a local model", long_about = None)]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Default, ClapArgs)]
pub struct GlobalArgs {
    /// Settings file (TOML or JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Model to use instead of the configured one
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Local model endpoint
    #[arg(long, global = true)]
    pub ollama_url: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,
}

impl GlobalArgs {
    /// Apply command line overrides on top of loaded settings
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(model) = &self.model {
            settings.selected_model = model.clone();
        }
        if let Some(url) = &self.ollama_url {
            settings.ollama_url = url.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReplyMode {
    Ask,
    Agent,
}

impl From<ReplyMode> for ChatMode {
    fn from(mode: ReplyMode) -> Self {
        match mode {
            ReplyMode::Ask => ChatMode::Ask,
            ReplyMode::Agent => ChatMode::Agent,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one message and stream the reply
    Chat {
        prompt: String,
        #[arg(long, value_enum, default_value = "agent")]
        mode: ReplyMode,
    },
    /// Plan a request, confirm it and execute it
    Plan {
        request: String,
        /// Execute without asking for confirmation
        #[arg(long)]
        yes: bool,
    },
    /// List tools offered by the configured MCP server
    Tools,
    /// Print the effective settings
    Config,
}
