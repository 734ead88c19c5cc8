//! CLI module
//!
//! Provides:
//! - Argument parsing (`chat`, `plan`, `tools`, `config`)
//! - Settings resolution (file, then environment, then flags)
//! - Tracing setup
//! - Subcommand execution

pub mod args;
pub mod commands;
pub mod logging;

use std::path::Path;

use agentloom_core::{Settings, SettingsManager};

use crate::llm;

pub use args::{Args, Command, GlobalArgs, ReplyMode};
pub use commands::{build_context, render_plan, run};
pub use logging::init_tracing;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] llm::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<agentloom_core::SettingsError> for Error {
    fn from(err: agentloom_core::SettingsError) -> Self {
        Error::Engine(err.into())
    }
}

/// Exit codes
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Load settings from `config` (or the default location) and apply flags
pub fn resolve_settings(config: Option<&Path>, global: &GlobalArgs) -> Result<Settings> {
    let manager = match config {
        Some(path) => SettingsManager::with_path(path)?,
        None => SettingsManager::new()?,
    };
    let mut settings = manager.into_settings();
    global.apply(&mut settings);
    Ok(settings)
}
