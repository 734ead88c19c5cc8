//! Remote provider channel
//!
//! Providers other than the local endpoint run behind an event-based
//! transport owned by the host application. The dispatcher only needs to
//! start a chat, read its named events, and ask it to stop.

use agentloom_core::{Message, ToolCallStatus, Usage};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::llm::request::GenerationRequest;

/// Dispatcher errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Chat socket not connected. Please reconnect and try again.")]
    RemoteUnavailable,

    #[error("Remote provider error: {0}")]
    Remote(String),
}

/// Payload of the outbound `chat` event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteChatRequest {
    pub provider: String,
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub context_size: u32,
    pub max_iterations: usize,
}

impl From<&GenerationRequest> for RemoteChatRequest {
    fn from(request: &GenerationRequest) -> Self {
        Self {
            provider: request.provider.clone(),
            model: request.model.clone(),
            messages: request.messages.clone(),
            system_prompt: request.system_prompt.clone(),
            context_size: request.context_size,
            max_iterations: request.max_iterations,
        }
    }
}

/// Inbound event from a remote provider
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// Accumulated content so far
    Token {
        content: String,
        thinking: Option<String>,
    },
    ToolStart {
        id: String,
        name: String,
        args: Map<String, Value>,
    },
    ToolDone {
        id: String,
        name: Option<String>,
        result: Option<Value>,
        error: Option<String>,
        status: ToolCallStatus,
    },
    Done {
        content: String,
        thinking: Option<String>,
        usage: Option<Usage>,
    },
    Error {
        message: String,
    },
}

impl RemoteEvent {
    /// Decode a named event; unknown names and unusable payloads yield `None`
    ///
    /// Accepts both `chat:token` and bare `token` style names.
    pub fn decode(name: &str, payload: &Value) -> Option<Self> {
        let name = name.strip_prefix("chat:").unwrap_or(name);
        let text = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);

        match name {
            "token" => Some(RemoteEvent::Token {
                content: text("content").unwrap_or_default(),
                thinking: text("thinking"),
            }),
            "tool_start" => Some(RemoteEvent::ToolStart {
                id: text("id")?,
                name: text("name").unwrap_or_default(),
                args: payload
                    .get("args")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            }),
            "tool_done" => {
                let error = text("error");
                let status = match payload.get("status").and_then(Value::as_str) {
                    Some("success") => ToolCallStatus::Success,
                    Some("error") => ToolCallStatus::Error,
                    _ if error.is_some() => ToolCallStatus::Error,
                    _ => ToolCallStatus::Success,
                };
                Some(RemoteEvent::ToolDone {
                    id: text("id")?,
                    name: text("name").filter(|n| !n.is_empty()),
                    result: payload.get("result").filter(|r| !r.is_null()).cloned(),
                    error,
                    status,
                })
            }
            "done" => Some(RemoteEvent::Done {
                content: text("content").unwrap_or_default(),
                thinking: text("thinking"),
                usage: payload
                    .get("usage")
                    .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok()),
            }),
            "error" => Some(RemoteEvent::Error {
                message: text("message").unwrap_or_else(|| "Unknown remote error".to_string()),
            }),
            _ => None,
        }
    }
}

/// Event channel to a remote provider
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Emit the chat request and return the stream of inbound events
    async fn start_chat(
        &self,
        request: RemoteChatRequest,
    ) -> Result<mpsc::Receiver<RemoteEvent>, DispatchError>;

    /// Ask the provider to stop the in-flight generation
    fn stop_generation(&self);
}
