//! LLM Adapters
//!
//! Streaming client for the local model endpoint and the HTTP transport it
//! runs on.

pub mod ollama;
pub mod ollama_messages;
pub mod ollama_parse;
pub mod think;
pub mod transport;
pub mod transport_fake;
pub mod transport_http;
pub mod transport_types;

// Re-export common types
pub use ollama::{OllamaAdapter, RoundEnd, RoundOutput};
pub use ollama_parse::{RequestedToolCall, StreamDelta};
pub use think::{Split, ThinkSplitter};
pub use transport::{AdapterError, FakeRequest, FakeResponse, FakeTransport, HttpTransport, Transport};
