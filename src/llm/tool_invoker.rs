//! Tool invocation boundary
//!
//! The engine never executes tools itself. It hands a name and argument map
//! to a [`ToolInvoker`] and records whatever comes back.

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Tool invocation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("Tool service session not initialised")]
    NotInitialised,

    #[error("Tool service session expired")]
    SessionExpired,

    #[error("{message}")]
    Rpc { code: Option<i64>, message: String },

    #[error("Tool service HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Tool service unreachable: {0}")]
    Network(String),

    #[error("Invalid tool service response: {0}")]
    Parse(String),

    #[error("Tool invocation unavailable: {0}")]
    Unavailable(String),
}

/// Executes tool calls against an external service
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn call_tool(&self, name: &str, args: &Map<String, Value>) -> Result<Value, ToolError>;
}

/// Invoker used when no tool service is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopToolInvoker;

#[async_trait]
impl ToolInvoker for NoopToolInvoker {
    async fn call_tool(&self, name: &str, _args: &Map<String, Value>) -> Result<Value, ToolError> {
        Err(ToolError::Unavailable(format!(
            "no tool service configured for '{}'",
            name
        )))
    }
}
