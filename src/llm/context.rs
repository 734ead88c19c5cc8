//! Shared engine collaborators
//!
//! One [`EngineContext`] is built per chat session and cloned into every
//! component that issues generations.

use std::sync::Arc;

use agentloom_core::{Settings, Tool};

use crate::llm::adapters::Transport;
use crate::llm::dispatcher::RemoteChannel;
use crate::llm::tool_invoker::{NoopToolInvoker, ToolInvoker};

#[derive(Clone)]
pub struct EngineContext {
    pub settings: Arc<Settings>,
    pub transport: Arc<Transport>,
    pub invoker: Arc<dyn ToolInvoker>,
    /// Event channel for non-local providers
    pub remote: Option<Arc<dyn RemoteChannel>>,
    /// Tools offered to the model
    pub tools: Arc<Vec<Tool>>,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("provider", &self.settings.provider)
            .field("model", &self.settings.selected_model)
            .field("transport", &self.transport)
            .field("remote", &self.remote.is_some())
            .field("tools", &self.tools.len())
            .finish()
    }
}

impl EngineContext {
    /// Context with the real HTTP transport and no tools
    pub fn new(settings: Settings) -> Self {
        Self::with_transport(settings, Transport::default())
    }

    pub fn with_transport(settings: Settings, transport: Transport) -> Self {
        Self {
            settings: Arc::new(settings),
            transport: Arc::new(transport),
            invoker: Arc::new(NoopToolInvoker),
            remote: None,
            tools: Arc::new(Vec::new()),
        }
    }

    pub fn with_invoker(mut self, invoker: Arc<dyn ToolInvoker>) -> Self {
        self.invoker = invoker;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteChannel>) -> Self {
        self.remote = Some(remote);
        self
    }
}
