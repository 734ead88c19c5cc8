//! LLM engine
//!
//! Layers, leaf first:
//! - `adapters`: streaming protocol adapter for the local endpoint
//! - `tool_loop`: generate → invoke tools → resume
//! - `dispatcher`: local tool loop or remote event channel behind one API
//! - `planner`: free text → [`AgentPlan`](agentloom_core::AgentPlan)
//! - `approval`: single pending plan awaiting a human decision
//! - `orchestrator`: executes an approved plan group by group
//! - `session`: one conversation tying all of the above together

pub mod adapters;
pub mod approval;
pub mod context;
pub mod dispatcher;
pub mod events;
pub mod orchestrator;
pub mod planner;
pub mod request;
pub mod session;
pub mod tool_invoker;
pub mod tool_loop;

use agentloom_core::SettingsError;

pub use adapters::{AdapterError, FakeResponse, FakeTransport, HttpTransport, OllamaAdapter, Transport};
pub use approval::ApprovalGate;
pub use context::EngineContext;
pub use dispatcher::{DispatchError, GenerationDispatcher, RemoteChannel, RemoteChatRequest, RemoteEvent};
pub use events::{EventReceiver, EventSink, GenerationEvent};
pub use orchestrator::{OrchestrationEngine, OrchestrationEvent, OrchestrationResult, TaskResult};
pub use planner::{parse_plan, PlanError, PlanningEngine};
pub use request::{GenerationOutcome, GenerationRequest};
pub use session::{ChatSession, SessionEvent, StopHandle};
pub use tool_invoker::{NoopToolInvoker, ToolError, ToolInvoker};
pub use tool_loop::ToolLoop;

/// Any engine error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("LLM not configured: {0}")]
    NotConfigured(String),
}
