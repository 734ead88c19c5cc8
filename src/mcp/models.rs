//! MCP JSON-RPC message shapes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize)]
pub struct McpRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    pub fn new(id: u64, method: &'static str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params: Some(params),
        }
    }

    pub fn initialize(id: u64, client: &ClientInfo) -> Self {
        Self::new(
            id,
            "initialize",
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": client,
            }),
        )
    }

    pub fn call_tool(id: u64, name: &str, arguments: &Map<String, Value>) -> Self {
        Self::new(
            id,
            "tools/call",
            serde_json::json!({ "name": name, "arguments": arguments }),
        )
    }

    pub fn list_tools(id: u64) -> Self {
        Self::new(id, "tools/list", serde_json::json!({}))
    }
}

/// JSON-RPC error member
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct McpError {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Client identification sent on initialize
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "agentloom".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Entry of a `tools/list` result
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolList {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}
