//! Ollama Adapter
//!
//! Streaming client for a local Ollama `/api/chat` endpoint using NDJSON.
//! One call to [`OllamaAdapter::stream_round`] is one network request.

use std::sync::Arc;

use agentloom_core::{Message, Tool, Usage};
use futures::stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::llm::adapters::ollama_messages::build_chat_body;
use crate::llm::adapters::ollama_parse::{decode_record, LineBuffer, RequestedToolCall, StreamDelta};
use crate::llm::adapters::think::{Split, ThinkSplitter};
use crate::llm::adapters::transport::{AdapterError, StreamResponse, Transport};

/// Result of one generation round
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutput {
    pub content: String,
    pub thinking: String,
    pub tool_calls: Vec<RequestedToolCall>,
    pub usage: Option<Usage>,
}

/// How a round ended
#[derive(Debug, Clone, PartialEq)]
pub enum RoundEnd {
    Finished(RoundOutput),
    /// Aborted through the cancellation token; not an error
    Cancelled,
}

/// Ollama adapter (local HTTP API)
#[derive(Debug, Clone)]
pub struct OllamaAdapter {
    /// Base URL (e.g., http://localhost:11434)
    base_url: String,
    api_key: Option<String>,
    /// Model name (e.g., llama3.1)
    model: String,
    /// Context window (`num_ctx`)
    context_size: u32,
    transport: Arc<Transport>,
}

impl OllamaAdapter {
    pub fn new(base_url: &str, model: &str, transport: Arc<Transport>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            model: model.to_string(),
            context_size: 8192,
            transport,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    pub fn with_context_size(mut self, context_size: u32) -> Self {
        self.context_size = context_size;
        self
    }

    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post_chat(&self, body: &str) -> Result<StreamResponse, AdapterError> {
        let auth = self.api_key.as_ref().map(|k| format!("Bearer {}", k));
        let mut headers = vec![("Content-Type", "application/json")];
        if let Some(auth) = auth.as_deref() {
            headers.push(("Authorization", auth));
        }
        self.transport.post(&self.chat_url(), &headers, body).await
    }

    /// Issue one streaming request and decode its records
    ///
    /// The stream ends early, without an error item, once `cancel` fires.
    /// Malformed lines are skipped.
    pub fn deltas(
        &self,
        body: String,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<StreamDelta, AdapterError>> + Send + '_ {
        async_stream::stream! {
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                res = self.post_chat(&body) => Some(res),
            };
            let mut response = match response {
                None => return,
                Some(Err(e)) => {
                    yield Err(e);
                    return;
                }
                Some(Ok(r)) => r,
            };

            if !response.is_success() {
                let status = response.status;
                let message = response.text().await.unwrap_or_default();
                yield Err(AdapterError::Http {
                    status,
                    message: message.trim().to_string(),
                });
                return;
            }

            let mut lines = LineBuffer::new();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    chunk = response.body.next() => Some(chunk),
                };
                let chunk = match next {
                    None => return,
                    Some(None) => break,
                    Some(Some(Err(e))) => {
                        yield Err(e);
                        return;
                    }
                    Some(Some(Ok(chunk))) => chunk,
                };
                for line in lines.push(&chunk) {
                    if let Some(deltas) = decode_record(&line) {
                        for delta in deltas {
                            yield Ok(delta);
                        }
                    } else {
                        debug!("Skipping malformed stream record: {}", preview(&line));
                    }
                }
            }

            if let Some(line) = lines.finish() {
                if let Some(deltas) = decode_record(&line) {
                    for delta in deltas {
                        yield Ok(delta);
                    }
                } else {
                    debug!("Skipping malformed trailing record: {}", preview(&line));
                }
            }
        }
    }

    /// Run one generation round
    ///
    /// `on_progress` receives the thinking/visible split after every content
    /// or thinking delta. Proposed tool calls are collected, not executed.
    pub async fn stream_round<F>(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        tools: &[Tool],
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<RoundEnd, AdapterError>
    where
        F: FnMut(&Split),
    {
        let body =
            build_chat_body(&self.model, messages, system_prompt, tools, self.context_size).to_string();
        debug!(
            "Ollama round: model={} messages={} tools={}",
            self.model,
            messages.len(),
            tools.len()
        );

        let stream = self.deltas(body, cancel.clone());
        futures::pin_mut!(stream);

        let mut splitter = ThinkSplitter::new();
        let mut tool_calls = Vec::new();
        let mut finished: Option<Option<Usage>> = None;

        while let Some(delta) = stream.next().await {
            match delta? {
                StreamDelta::ToolCalls(calls) => tool_calls.extend(calls),
                StreamDelta::Thinking(text) => {
                    splitter.push_thinking(&text);
                    on_progress(&splitter.snapshot());
                }
                StreamDelta::Content(text) => {
                    splitter.push_content(&text);
                    on_progress(&splitter.snapshot());
                }
                StreamDelta::Done(usage) => {
                    finished = Some(usage);
                    break;
                }
                StreamDelta::Failed(message) => return Err(AdapterError::Provider(message)),
            }
        }

        match finished {
            Some(usage) => {
                let split = splitter.finish();
                Ok(RoundEnd::Finished(RoundOutput {
                    content: split.content,
                    thinking: split.thinking,
                    tool_calls,
                    usage,
                }))
            }
            None if cancel.is_cancelled() => Ok(RoundEnd::Cancelled),
            None => Err(AdapterError::Streaming(
                "stream ended before the final record".to_string(),
            )),
        }
    }
}

fn preview(line: &str) -> String {
    line.chars().take(80).collect()
}
