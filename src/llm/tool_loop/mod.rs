//! Streaming tool loop
//!
//! Wraps [`OllamaAdapter`] rounds: after every round that proposes tool
//! calls, the calls run through the [`ToolInvoker`], their results are
//! appended to the conversation, and generation is issued again. A round
//! without tool calls, or the round cap, ends the loop.

pub mod constants;
pub mod loop_state;

use std::sync::Arc;

use agentloom_core::ToolCall;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::llm::adapters::{OllamaAdapter, RequestedToolCall, RoundEnd, Transport};
use crate::llm::events::{EventSink, GenerationEvent};
use crate::llm::request::{GenerationOutcome, GenerationRequest};
use crate::llm::tool_invoker::ToolInvoker;

pub use constants::{DEFAULT_MAX_ITERATIONS, MISSING_TOOL_PREFIX};
pub use loop_state::{LoopAction, LoopPhase, LoopState};

/// In-process generate → invoke → resume loop
pub struct ToolLoop<'a> {
    adapter: OllamaAdapter,
    invoker: &'a dyn ToolInvoker,
}

impl<'a> ToolLoop<'a> {
    pub fn new(adapter: OllamaAdapter, invoker: &'a dyn ToolInvoker) -> Self {
        Self { adapter, invoker }
    }

    /// Loop talking to the endpoint named in `request`
    pub fn for_request(
        request: &GenerationRequest,
        transport: Arc<Transport>,
        invoker: &'a dyn ToolInvoker,
    ) -> Self {
        let adapter = OllamaAdapter::new(&request.ollama_url, &request.model, transport)
            .with_api_key(request.api_key.clone())
            .with_context_size(request.context_size);
        Self::new(adapter, invoker)
    }

    /// Run to completion, failure or cancellation
    ///
    /// Emits exactly one of `Done`/`Error` unless cancelled, in which case
    /// nothing further is emitted.
    pub async fn run(
        &self,
        request: &GenerationRequest,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> GenerationOutcome {
        let mut state = LoopState::new(request.messages.clone(), request.max_iterations);

        loop {
            state.begin_round();
            debug!(
                "Tool loop round {}/{} ({} messages)",
                state.iteration,
                state.max_iterations,
                state.messages.len()
            );

            let round = self
                .adapter
                .stream_round(
                    &state.messages,
                    request.system_prompt.as_deref(),
                    &request.tools,
                    cancel,
                    |split| {
                        sink.emit(GenerationEvent::Token {
                            content: split.content.clone(),
                            thinking: split.thinking.clone(),
                        })
                    },
                )
                .await;

            let output = match round {
                Ok(RoundEnd::Finished(output)) => output,
                Ok(RoundEnd::Cancelled) => {
                    debug!("Tool loop cancelled during round {}", state.iteration);
                    return GenerationOutcome::Cancelled;
                }
                Err(_) if cancel.is_cancelled() => return GenerationOutcome::Cancelled,
                Err(e) => {
                    warn!("Generation round {} failed: {}", state.iteration, e);
                    let message = e.to_string();
                    sink.emit(GenerationEvent::Error(message.clone()));
                    return GenerationOutcome::Failed(message);
                }
            };

            if let Some(usage) = output.usage {
                sink.emit(GenerationEvent::Usage(usage));
            }

            match state.decide(&output) {
                LoopAction::Complete { content, thinking } => {
                    sink.emit(GenerationEvent::Done {
                        content: content.clone(),
                        thinking: thinking.clone(),
                    });
                    return GenerationOutcome::Completed { content, thinking };
                }
                LoopAction::InvokeTools(requested) => {
                    info!(
                        "Round {} requested {} tool call(s)",
                        state.iteration,
                        requested.len()
                    );
                    let mut finished = Vec::with_capacity(requested.len());
                    for call in requested {
                        match self.invoke(call, request, sink, cancel).await {
                            Some(call) => finished.push(call),
                            None => return GenerationOutcome::Cancelled,
                        }
                    }
                    state.record_round(&output.content, &output.thinking, finished);
                }
            }
        }
    }

    /// Drive one call through its statuses; `None` when cancelled midway
    async fn invoke(
        &self,
        requested: RequestedToolCall,
        request: &GenerationRequest,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> Option<ToolCall> {
        let mut call = ToolCall::pending(requested.name, requested.arguments);
        sink.emit(GenerationEvent::ToolCall(call.clone()));

        if !request.tools.iter().any(|t| t.name == call.name) {
            warn!("Model requested unknown tool '{}'", call.name);
            call.fail(format!("{}: {}", MISSING_TOOL_PREFIX, call.name));
            sink.emit(GenerationEvent::ToolCall(call.clone()));
            return Some(call);
        }

        call.start();
        sink.emit(GenerationEvent::ToolCall(call.clone()));
        debug!("Invoking tool {} ({})", call.name, call.id);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            result = self.invoker.call_tool(&call.name, &call.args) => result,
        };

        match result {
            Ok(value) => call.succeed(value),
            Err(e) => {
                warn!("Tool {} failed: {}", call.name, e);
                call.fail(e.to_string());
            }
        }
        sink.emit(GenerationEvent::ToolCall(call.clone()));
        Some(call)
    }
}
