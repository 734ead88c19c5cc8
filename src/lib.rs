//! Agentloom: LLM orchestration engine
//!
//! Streams tool-calling conversations against a local model endpoint,
//! plans multi-step work, waits for human approval and executes the plan
//! with concurrent task groups.

pub mod cli;
pub mod llm;
pub mod mcp;

pub use agentloom_core as core;
pub use llm::{ChatSession, EngineContext, Error};
