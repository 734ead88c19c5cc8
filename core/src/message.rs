//! Conversation messages and tool calls
//!
//! These types are owned by the enclosing chat session. The engine mutates a
//! message in place only while it is the component producing it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::agent::AgentPlan;

/// Message role
///
/// `Plan` and `Agent` are display-only roles used for plan bubbles and
/// orchestration summaries. They are never sent to a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    Plan,
    Agent,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::Plan => "plan",
            Role::Agent => "agent",
        }
    }

    /// Whether messages with this role are part of the model conversation
    pub fn is_conversational(&self) -> bool {
        !matches!(self, Role::Plan | Role::Agent)
    }
}

/// Binary attachment carried as base64 text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Base64 payload, optionally prefixed with a `data:<mime>;base64,` header
    pub base64: String,
    pub size: u64,
}

impl Attachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, base64: impl Into<String>) -> Self {
        let base64 = base64.into();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            mime_type: mime_type.into(),
            size: (base64.len() as u64 * 3) / 4,
            base64,
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Raw base64 with any data-URL header removed
    pub fn payload(&self) -> &str {
        match self.base64.rsplit_once(',') {
            Some((_, data)) => data,
            None => &self.base64,
        }
    }
}

/// Lifecycle of a single tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl ToolCallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ToolCallStatus::Success | ToolCallStatus::Error)
    }
}

/// A tool call requested by a model
///
/// Immutable once it reaches `Success` or `Error`: later transitions are
/// ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Map<String, Value>,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCall {
    /// New pending call with a fresh `tc-` identifier
    pub fn pending(name: impl Into<String>, args: Map<String, Value>) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("tc-{}", &id[..12]),
            name: name.into(),
            args,
            status: ToolCallStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn start(&mut self) {
        if !self.status.is_terminal() {
            self.status = ToolCallStatus::Running;
        }
    }

    pub fn succeed(&mut self, result: Value) {
        if !self.status.is_terminal() {
            self.status = ToolCallStatus::Success;
            self.result = Some(result);
        }
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        if !self.status.is_terminal() {
            self.status = ToolCallStatus::Error;
            self.error = Some(error.into());
        }
    }

    /// Text fed back to the model as this call's result
    pub fn result_text(&self) -> String {
        match (&self.result, &self.error) {
            (Some(result), _) => result.to_string(),
            (None, Some(error)) => error.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Tool definition supplied by the tool registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Token accounting reported at the end of a generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// One conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_plan: Option<AgentPlan>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            thinking: None,
            tool_calls: Vec::new(),
            attachments: Vec::new(),
            created_at: Utc::now(),
            is_streaming: false,
            error: None,
            agent_plan: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Tool message carrying the outcome of finished calls
    pub fn tool_results(calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::new(Role::Tool, "");
        msg.tool_calls = calls;
        msg
    }

    /// Empty placeholder that is being streamed into
    pub fn streaming(role: Role) -> Self {
        let mut msg = Self::new(role, "");
        msg.is_streaming = true;
        msg
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Thinking text, treating an empty string as absent
    pub fn thinking_text(&self) -> Option<&str> {
        self.thinking.as_deref().filter(|t| !t.is_empty())
    }
}
