//! Shared helpers for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agentloom::llm::adapters::{FakeRequest, FakeResponse, FakeTransport};
use agentloom::llm::{
    DispatchError, EngineContext, EventReceiver, GenerationEvent, RemoteChannel, RemoteChatRequest,
    RemoteEvent, ToolError, ToolInvoker,
};
use agentloom_core::{Settings, Tool};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

pub const THINK_SPLIT: &str = include_str!("../fixtures/think_split.ndjson");
pub const TOOL_CALL_ROUND: &str = include_str!("../fixtures/tool_call_round.ndjson");
pub const TWO_TOOL_CALLS: &str = include_str!("../fixtures/two_tool_calls.ndjson");
pub const FINAL_ANSWER: &str = include_str!("../fixtures/final_answer.ndjson");
pub const PLAN_RESPONSE: &str = include_str!("../fixtures/plan_response.ndjson");

pub fn settings() -> Settings {
    Settings {
        selected_model: "qwen3".into(),
        ..Settings::default()
    }
}

pub fn context(fake: &FakeTransport) -> EngineContext {
    EngineContext::with_transport(settings(), fake.clone().into())
}

/// Single-record NDJSON answer
pub fn answer(content: &str) -> FakeResponse {
    let record = json!({"message": {"role": "assistant", "content": content}, "done": true});
    FakeResponse::ndjson(&record.to_string())
}

/// Content of the last message in a chat request body
pub fn last_user_text(request: &FakeRequest) -> String {
    request.json()["messages"]
        .as_array()
        .and_then(|m| m.last())
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string()
}

pub fn tool(name: &str) -> Tool {
    Tool::new(name, format!("{} tool", name), json!({"type": "object", "properties": {}}))
}

/// Drain whatever is buffered on an event receiver
pub fn drain(rx: &mut EventReceiver) -> Vec<GenerationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Tool invoker answering from a table; unknown names fail
#[derive(Default)]
pub struct ScriptedInvoker {
    results: HashMap<String, Result<Value, ToolError>>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(mut self, name: &str, value: Value) -> Self {
        self.results.insert(name.to_string(), Ok(value));
        self
    }

    pub fn err(mut self, name: &str, message: &str) -> Self {
        self.results.insert(
            name.to_string(),
            Err(ToolError::Rpc {
                code: None,
                message: message.to_string(),
            }),
        );
        self
    }

    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolInvoker for ScriptedInvoker {
    async fn call_tool(&self, name: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
        self.calls.lock().unwrap().push((name.to_string(), args.clone()));
        self.results
            .get(name)
            .cloned()
            .unwrap_or_else(|| Err(ToolError::Unavailable(name.to_string())))
    }
}

/// Remote channel replaying a fixed event script
pub struct FakeRemote {
    connected: AtomicBool,
    script: Vec<RemoteEvent>,
    /// Keep the stream open after the script instead of closing it
    hang: bool,
    pub requests: Mutex<Vec<RemoteChatRequest>>,
    pub stops: AtomicUsize,
}

impl FakeRemote {
    pub fn new(script: Vec<RemoteEvent>) -> Self {
        Self {
            connected: AtomicBool::new(true),
            script,
            hang: false,
            requests: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn disconnected(self) -> Self {
        self.connected.store(false, Ordering::SeqCst);
        self
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteChannel for FakeRemote {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn start_chat(
        &self,
        request: RemoteChatRequest,
    ) -> Result<mpsc::Receiver<RemoteEvent>, DispatchError> {
        self.requests.lock().unwrap().push(request);
        let (tx, rx) = mpsc::channel(16);
        let script = self.script.clone();
        let hang = self.hang;
        tokio::spawn(async move {
            for event in script {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            if hang {
                tx.closed().await;
            }
        });
        Ok(rx)
    }

    fn stop_generation(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn remote_context(fake: &FakeTransport, remote: Arc<FakeRemote>) -> EngineContext {
    let settings = Settings {
        provider: "anthropic".into(),
        ..settings()
    };
    EngineContext::with_transport(settings, fake.clone().into()).with_remote(remote)
}
