//! Generation request and outcome

use agentloom_core::settings::LOCAL_PROVIDER;
use agentloom_core::{Message, Settings, Tool};
use tokio_util::sync::CancellationToken;

use crate::llm::events::EventSink;
use crate::llm::tool_loop::constants::DEFAULT_MAX_ITERATIONS;

/// Everything one generation needs
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Provider identifier; decides local tool loop vs remote channel
    pub provider: String,
    pub ollama_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Conversation so far, oldest first
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
    pub context_size: u32,
    /// Tools the model may call
    pub tools: Vec<Tool>,
    /// Cap on generation rounds
    pub max_iterations: usize,
    pub cancel: CancellationToken,
    pub events: EventSink,
}

impl GenerationRequest {
    pub fn new(model: &str, messages: Vec<Message>) -> Self {
        let defaults = Settings::default();
        Self {
            provider: LOCAL_PROVIDER.to_string(),
            ollama_url: defaults.ollama_url,
            api_key: None,
            model: model.to_string(),
            messages,
            system_prompt: None,
            context_size: defaults.context_size,
            tools: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            cancel: CancellationToken::new(),
            events: EventSink::discard(),
        }
    }

    /// Request parameters taken from settings
    pub fn from_settings(settings: &Settings, messages: Vec<Message>) -> Self {
        Self {
            provider: settings.provider.clone(),
            ollama_url: settings.ollama_base_url().to_string(),
            api_key: settings.ollama_api_key.clone(),
            context_size: settings.context_size,
            system_prompt: settings.effective_system_prompt(None),
            max_iterations: settings.max_iterations.max(1),
            ..Self::new(&settings.selected_model, messages)
        }
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = provider.to_string();
        self
    }

    pub fn with_ollama_url(mut self, url: &str) -> Self {
        self.ollama_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Whether this request runs through the in-process tool loop
    pub fn is_local(&self) -> bool {
        let provider = self.provider.trim().to_lowercase();
        provider == LOCAL_PROVIDER || provider == "local"
    }
}

/// How a generation ended
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Completed { content: String, thinking: String },
    Failed(String),
    /// Stopped by the caller; never reported as an error
    Cancelled,
}

impl GenerationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, GenerationOutcome::Completed { .. })
    }

    /// Final content when completed
    pub fn content(&self) -> Option<&str> {
        match self {
            GenerationOutcome::Completed { content, .. } => Some(content),
            _ => None,
        }
    }
}
