//! Settings management
//!
//! Chat settings persisted as TOML (or JSON) under the user's config
//! directory, with `AGENTLOOM_*` environment overrides applied on load.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::agent::ChatMode;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "AGENTLOOM_";

/// Provider identifier that runs the tool loop in-process
pub const LOCAL_PROVIDER: &str = "ollama";

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Unsupported settings format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(String),

    #[error("Failed to serialize settings: {0}")]
    Serialize(String),
}

/// Settings file format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SettingsFormat {
    Json,
    #[default]
    Toml,
}

impl SettingsFormat {
    /// Format implied by a file extension
    pub fn from_path(path: &Path) -> Result<Self, SettingsError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") | None => Ok(SettingsFormat::Toml),
            Some("json") => Ok(SettingsFormat::Json),
            Some(other) => Err(SettingsError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Provider identifier; `ollama` (alias `local`) runs in-process
    pub provider: String,
    pub ollama_url: String,
    pub ollama_api_key: Option<String>,
    pub selected_model: String,
    /// Context window passed as `num_ctx`
    pub context_size: u32,
    pub system_prompt: String,
    pub max_iterations: usize,
    pub chat_mode: ChatMode,
    pub mcp_url: Option<String>,
    pub mcp_api_key: Option<String>,
    /// Cap on concurrently running tasks per plan group; unbounded when unset
    pub max_parallel_tasks: Option<usize>,
    pub request_timeout_secs: u64,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: LOCAL_PROVIDER.to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_api_key: None,
            selected_model: String::new(),
            context_size: 8192,
            system_prompt: String::new(),
            max_iterations: 10,
            chat_mode: ChatMode::Agent,
            mcp_url: None,
            mcp_api_key: None,
            max_parallel_tasks: None,
            request_timeout_secs: 300,
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Settings {
    /// Whether generations run through the in-process tool loop
    pub fn is_local_provider(&self) -> bool {
        let provider = self.provider.trim().to_lowercase();
        provider == LOCAL_PROVIDER || provider == "local"
    }

    /// Whether enough is configured to start a generation
    pub fn is_configured(&self) -> bool {
        let has_model = !self.selected_model.trim().is_empty();
        if self.is_local_provider() {
            !self.ollama_url.trim().is_empty() && has_model
        } else {
            has_model
        }
    }

    /// Session override, else configured prompt, else none
    pub fn effective_system_prompt(&self, session_override: Option<&str>) -> Option<String> {
        session_override
            .filter(|p| !p.trim().is_empty())
            .map(str::to_string)
            .or_else(|| Some(self.system_prompt.clone()).filter(|p| !p.trim().is_empty()))
    }

    /// Endpoint URL without a trailing slash
    pub fn ollama_base_url(&self) -> &str {
        self.ollama_url.trim_end_matches('/')
    }

    /// Apply overrides looked up through `lookup` (usually the process env)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(provider) = var("PROVIDER") {
            self.provider = provider;
            debug!("Applied env override for provider");
        }
        if let Some(url) = var("OLLAMA_URL") {
            self.ollama_url = url;
            debug!("Applied env override for ollama url");
        }
        if let Some(key) = var("OLLAMA_API_KEY") {
            self.ollama_api_key = Some(key);
            debug!("Applied env override for ollama api key");
        }
        if let Some(model) = var("MODEL") {
            self.selected_model = model;
            debug!("Applied env override for model");
        }
        if let Some(prompt) = var("SYSTEM_PROMPT") {
            self.system_prompt = prompt;
            debug!("Applied env override for system prompt");
        }
        if let Some(url) = var("MCP_URL") {
            self.mcp_url = Some(url);
            debug!("Applied env override for mcp url");
        }
        if let Some(key) = var("MCP_API_KEY") {
            self.mcp_api_key = Some(key);
            debug!("Applied env override for mcp api key");
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.log_level = level;
            debug!("Applied env override for log level");
        }
        if let Some(dir) = var("LOG_DIR") {
            self.log_dir = Some(PathBuf::from(dir));
            debug!("Applied env override for log dir");
        }
        if let Some(mode) = var("CHAT_MODE") {
            match mode.parse::<ChatMode>() {
                Ok(mode) => self.chat_mode = mode,
                Err(e) => warn!("Ignoring {}CHAT_MODE: {}", ENV_PREFIX, e),
            }
        }

        override_number(&var, "CONTEXT_SIZE", &mut self.context_size);
        override_number(&var, "MAX_ITERATIONS", &mut self.max_iterations);
        override_number(&var, "REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs);

        if let Some(raw) = var("MAX_PARALLEL_TASKS") {
            match raw.parse::<usize>() {
                Ok(0) => self.max_parallel_tasks = None,
                Ok(n) => self.max_parallel_tasks = Some(n),
                Err(_) => warn!("Ignoring non-numeric {}MAX_PARALLEL_TASKS={}", ENV_PREFIX, raw),
            }
        }
    }
}

fn override_number<T, F>(var: &F, name: &str, slot: &mut T)
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = var(name) {
        match raw.parse::<T>() {
            Ok(value) => {
                *slot = value;
                debug!("Applied env override for {}", name.to_lowercase());
            }
            Err(_) => warn!("Ignoring non-numeric {}{}={}", ENV_PREFIX, name, raw),
        }
    }
}

/// Loads, saves and overrides [`Settings`]
#[derive(Debug)]
pub struct SettingsManager {
    path: PathBuf,
    format: SettingsFormat,
    settings: Settings,
}

impl SettingsManager {
    /// Open `<config dir>/agentloom/settings.toml`, creating it when missing
    pub fn new() -> Result<Self, SettingsError> {
        let dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        Self::with_path(dir.join("agentloom").join("settings.toml"))
    }

    /// Open settings at an explicit path; format follows the extension
    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        let format = SettingsFormat::from_path(&path)?;

        let mut manager = Self {
            path,
            format,
            settings: Settings::default(),
        };

        if manager.path.exists() {
            manager.load()?;
        } else {
            manager.save()?;
        }

        manager.settings.apply_overrides(|name| std::env::var(name).ok());
        Ok(manager)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Reload from disk
    pub fn load(&mut self) -> Result<(), SettingsError> {
        let content = fs::read_to_string(&self.path).map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })?;

        self.settings = match self.format {
            SettingsFormat::Toml => {
                toml::from_str(&content).map_err(|e| SettingsError::Parse(e.to_string()))?
            }
            SettingsFormat::Json => {
                serde_json::from_str(&content).map_err(|e| SettingsError::Parse(e.to_string()))?
            }
        };

        info!("Loaded settings from {:?}", self.path);
        Ok(())
    }

    /// Write the current settings to disk
    pub fn save(&self) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = match self.format {
            SettingsFormat::Toml => toml::to_string_pretty(&self.settings)
                .map_err(|e| SettingsError::Serialize(e.to_string()))?,
            SettingsFormat::Json => serde_json::to_string_pretty(&self.settings)
                .map_err(|e| SettingsError::Serialize(e.to_string()))?,
        };

        fs::write(&self.path, content).map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })?;

        info!("Saved settings to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.is_local_provider());
        assert_eq!(settings.context_size, 8192);
        assert_eq!(settings.max_iterations, 10);
        assert!(settings.max_parallel_tasks.is_none());
        assert!(!settings.is_configured());
    }

    #[test]
    fn test_is_configured_by_provider() {
        let mut settings = Settings {
            selected_model: "llama3".into(),
            ..Settings::default()
        };
        assert!(settings.is_configured());

        settings.ollama_url.clear();
        assert!(!settings.is_configured());

        settings.provider = "openai".into();
        assert!(settings.is_configured());
        assert!(!settings.is_local_provider());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("AGENTLOOM_MODEL", "qwen3"),
            ("AGENTLOOM_CONTEXT_SIZE", "4096"),
            ("AGENTLOOM_MAX_ITERATIONS", "many"),
            ("AGENTLOOM_MAX_PARALLEL_TASKS", "3"),
            ("AGENTLOOM_CHAT_MODE", "ask"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(settings.selected_model, "qwen3");
        assert_eq!(settings.context_size, 4096);
        assert_eq!(settings.max_iterations, 10);
        assert_eq!(settings.max_parallel_tasks, Some(3));
        assert_eq!(settings.chat_mode, ChatMode::Ask);
    }

    #[test]
    fn test_effective_system_prompt() {
        let mut settings = Settings::default();
        assert_eq!(settings.effective_system_prompt(None), None);

        settings.system_prompt = "global".into();
        assert_eq!(settings.effective_system_prompt(None).as_deref(), Some("global"));
        assert_eq!(
            settings.effective_system_prompt(Some("task")).as_deref(),
            Some("task")
        );
        assert_eq!(
            settings.effective_system_prompt(Some(" ")).as_deref(),
            Some("global")
        );
    }

    #[test]
    fn test_manager_creates_and_reloads_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let mut manager = SettingsManager::with_path(&path).unwrap();
        assert!(path.exists());

        manager.settings_mut().selected_model = "mistral".into();
        manager.settings_mut().mcp_url = Some("http://localhost:3000/mcp".into());
        manager.save().unwrap();

        let reloaded = SettingsManager::with_path(&path).unwrap();
        assert_eq!(reloaded.settings().mcp_url.as_deref(), Some("http://localhost:3000/mcp"));
    }

    #[test]
    fn test_manager_json_and_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"context_size": 2048}"#).unwrap();

        let manager = SettingsManager::with_path(&path).unwrap();
        assert_eq!(manager.settings().context_size, 2048);
        assert_eq!(manager.settings().ollama_url, "http://localhost:11434");
    }

    #[test]
    fn test_unsupported_extension() {
        let err = SettingsFormat::from_path(Path::new("settings.yaml")).unwrap_err();
        assert!(matches!(err, SettingsError::UnsupportedFormat(_)));
    }
}
