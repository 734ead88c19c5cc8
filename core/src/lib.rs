//! Agentloom core
//!
//! Data model shared by the generation engine and its callers:
//! conversation messages, tool calls, agent plans, and settings.

pub mod agent;
pub mod message;
pub mod settings;

pub use agent::{AgentPlan, AgentTask, ChatMode, PlanStatus, TaskPatch, TaskStatus};
pub use message::{Attachment, Message, Role, Tool, ToolCall, ToolCallStatus, Usage};
pub use settings::{Settings, SettingsError, SettingsFormat, SettingsManager};
