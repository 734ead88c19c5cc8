//! MCP tool service client
//!
//! Implements [`ToolInvoker`](crate::llm::ToolInvoker) over the Model
//! Context Protocol streamable-HTTP transport.

pub mod client;
pub mod models;

pub use client::{parse_sse, McpToolInvoker, SESSION_HEADER};
pub use models::{ClientInfo, McpError, McpRequest, ToolDescriptor};
