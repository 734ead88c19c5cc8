//! MCP tool invoker
//!
//! Streamable-HTTP JSON-RPC client holding one session. A `404` on a call
//! means the server forgot the session (usually a restart): the client
//! initialises again with the same key and retries exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use agentloom_core::Tool;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::llm::adapters::{AdapterError, Transport};
use crate::llm::tool_invoker::{ToolError, ToolInvoker};
use crate::mcp::models::{ClientInfo, McpError, McpRequest, ToolList};

pub const SESSION_HEADER: &str = "Mcp-Session-Id";

#[derive(Debug, Clone)]
struct McpSession {
    id: String,
}

/// Raw reply to one JSON-RPC post
struct Reply {
    status: u16,
    session: Option<String>,
    body: Result<Value, String>,
}

#[derive(Debug)]
pub struct McpToolInvoker {
    url: String,
    api_key: Option<String>,
    client: ClientInfo,
    transport: Arc<Transport>,
    session: RwLock<Option<McpSession>>,
    next_id: AtomicU64,
}

impl McpToolInvoker {
    pub fn new(url: &str, api_key: Option<String>, transport: Arc<Transport>) -> Self {
        Self {
            url: url.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client: ClientInfo::default(),
            transport,
            session: RwLock::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn has_session(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Discard the session, e.g. after switching credentials
    pub async fn reset(&self) {
        self.session.write().await.take();
    }

    /// Open a session; requires HTTP 200 and a session header
    pub async fn initialize(&self) -> Result<(), ToolError> {
        let request = McpRequest::initialize(self.request_id(), &self.client);
        let reply = self.post(&request, None).await?;

        if reply.status != 200 {
            let detail = match reply.body {
                Ok(value) => value.to_string(),
                Err(text) => text,
            };
            return Err(ToolError::Http {
                status: reply.status,
                message: format!("MCP init failed: {}", detail),
            });
        }
        let id = reply.session.ok_or_else(|| {
            ToolError::Parse(format!("server did not return a {} header", SESSION_HEADER))
        })?;

        info!("MCP session initialised at {}", self.url);
        *self.session.write().await = Some(McpSession { id });
        Ok(())
    }

    /// Tools the server offers
    pub async fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        let result = self
            .with_session(|id, session| async move {
                self.rpc(&McpRequest::list_tools(id), &session).await
            })
            .await?;
        let list: ToolList = serde_json::from_value(result).map_err(|e| ToolError::Parse(e.to_string()))?;
        Ok(list
            .tools
            .into_iter()
            .map(|t| Tool::new(t.name, t.description, t.input_schema))
            .collect())
    }

    fn request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Run `op` with the current session, re-initialising once on expiry
    async fn with_session<F, Fut>(&self, op: F) -> Result<Value, ToolError>
    where
        F: Fn(u64, String) -> Fut,
        Fut: std::future::Future<Output = Result<Value, ToolError>>,
    {
        let session = self
            .session
            .read()
            .await
            .clone()
            .ok_or(ToolError::NotInitialised)?;

        match op(self.request_id(), session.id).await {
            Err(ToolError::SessionExpired) => {
                warn!("MCP session expired, re-initialising");
                self.initialize().await?;
                let session = self
                    .session
                    .read()
                    .await
                    .clone()
                    .ok_or(ToolError::NotInitialised)?;
                op(self.request_id(), session.id).await
            }
            other => other,
        }
    }

    async fn rpc(&self, request: &McpRequest, session: &str) -> Result<Value, ToolError> {
        let reply = self.post(request, Some(session)).await?;
        if reply.status == 404 {
            return Err(ToolError::SessionExpired);
        }
        let body = match reply.body {
            Ok(body) => body,
            Err(text) if (200..300).contains(&reply.status) => {
                return Err(ToolError::Parse(text));
            }
            Err(text) => {
                return Err(ToolError::Http {
                    status: reply.status,
                    message: text.trim().to_string(),
                })
            }
        };
        if !(200..300).contains(&reply.status) {
            return Err(ToolError::Http {
                status: reply.status,
                message: body.to_string(),
            });
        }

        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            let error: McpError = serde_json::from_value(error.clone())
                .map_err(|e| ToolError::Parse(format!("malformed error member: {}", e)))?;
            return Err(ToolError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        match body.get("result") {
            Some(result) if !result.is_null() => Ok(result.clone()),
            _ => Ok(body),
        }
    }

    async fn post(&self, request: &McpRequest, session: Option<&str>) -> Result<Reply, ToolError> {
        let body = serde_json::to_string(request).map_err(|e| ToolError::Parse(e.to_string()))?;
        let auth = self.api_key.as_ref().map(|k| format!("Bearer {}", k));

        let mut headers = vec![
            ("Content-Type", "application/json"),
            ("Accept", "application/json, text/event-stream"),
        ];
        if let Some(auth) = auth.as_deref() {
            headers.push(("Authorization", auth));
        }
        if let Some(session) = session {
            headers.push((SESSION_HEADER, session));
        }

        debug!("MCP {} (id {})", request.method, request.id);
        let response = self
            .transport
            .post(&self.url, &headers, &body)
            .await
            .map_err(transport_error)?;

        let status = response.status;
        let session = response.header(SESSION_HEADER).map(str::to_string);
        let is_sse = response
            .header("Content-Type")
            .map_or(false, |ct| ct.contains("text/event-stream"));
        let text = response.text().await.map_err(transport_error)?;

        let body: Result<Value, String> = if is_sse {
            parse_sse(&text).ok_or(text)
        } else {
            serde_json::from_str(&text).map_err(|_| text)
        };
        Ok(Reply { status, session, body })
    }
}

#[async_trait]
impl ToolInvoker for McpToolInvoker {
    async fn call_tool(&self, name: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
        self.with_session(|id, session| async move {
            self.rpc(&McpRequest::call_tool(id, name, args), &session).await
        })
        .await
    }
}

/// JSON payload of the last `data:` line of an event stream
pub fn parse_sse(text: &str) -> Option<Value> {
    text.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .last()
        .and_then(|data| serde_json::from_str(data).ok())
}

fn transport_error(err: AdapterError) -> ToolError {
    match err {
        AdapterError::Http { status, message } => ToolError::Http { status, message },
        other => ToolError::Network(other.to_string()),
    }
}
