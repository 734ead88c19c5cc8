//! Generation dispatcher
//!
//! The single entry point for generations. The local provider runs the
//! in-process [`ToolLoop`]; any other provider goes through the
//! [`RemoteChannel`] and its events are re-synthesized into the same
//! [`GenerationEvent`] sequence.
//!
//! Every generate call gets a fresh epoch. `stop()` advances the epoch, so a
//! stopped generation can no longer deliver events even if its transport
//! keeps producing them.

pub mod remote;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use agentloom_core::{ToolCall, ToolCallStatus};
use futures::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::llm::context::EngineContext;
use crate::llm::events::{EventSink, GenerationEvent};
use crate::llm::request::{GenerationOutcome, GenerationRequest};
use crate::llm::tool_loop::ToolLoop;

pub use remote::{DispatchError, RemoteChannel, RemoteChatRequest, RemoteEvent};

#[derive(Debug)]
struct ActiveGeneration {
    epoch: u64,
    cancel: CancellationToken,
}

/// Provider-agnostic generation entry point
pub struct GenerationDispatcher {
    context: EngineContext,
    epoch: Arc<AtomicU64>,
    generating: watch::Sender<bool>,
    active: Mutex<Option<ActiveGeneration>>,
}

impl std::fmt::Debug for GenerationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationDispatcher")
            .field("epoch", &self.epoch.load(Ordering::SeqCst))
            .field("generating", &self.is_generating())
            .finish()
    }
}

impl GenerationDispatcher {
    pub fn new(context: EngineContext) -> Self {
        let (generating, _) = watch::channel(false);
        Self {
            context,
            epoch: Arc::new(AtomicU64::new(0)),
            generating,
            active: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    pub fn is_generating(&self) -> bool {
        *self.generating.borrow()
    }

    /// Observe the generating flag
    pub fn subscribe_generating(&self) -> watch::Receiver<bool> {
        self.generating.subscribe()
    }

    /// Run one generation; events go to `request.events`
    ///
    /// Starting a generation while another is active on this dispatcher
    /// cancels the older one.
    pub async fn generate(&self, request: GenerationRequest) -> GenerationOutcome {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = request.cancel.child_token();
        let remote = !request.is_local();

        let previous = self.lock_active().replace(ActiveGeneration {
            epoch,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            debug!("Generation {} superseded by {}", previous.epoch, epoch);
            previous.cancel.cancel();
        }
        self.generating.send_replace(true);

        let sink = request.events.gated(self.epoch.clone(), epoch);
        let outcome = if remote {
            self.run_remote(&request, &sink, &cancel).await
        } else {
            ToolLoop::for_request(
                &request,
                self.context.transport.clone(),
                self.context.invoker.as_ref(),
            )
            .run(&request, &sink, &cancel)
            .await
        };

        let mut active = self.lock_active();
        if active.as_ref().map(|a| a.epoch) == Some(epoch) {
            active.take();
            self.generating.send_replace(false);
        }
        outcome
    }

    /// Stop the in-flight generation
    ///
    /// Idempotent. No event from the stopped generation is delivered after
    /// this returns. A remote generation forwards the stop to its channel
    /// once it observes the cancellation.
    pub fn stop(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let active = self.lock_active().take();
        if let Some(active) = active {
            info!("Stopping generation {}", active.epoch);
            active.cancel.cancel();
        }
        self.generating.send_replace(false);
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveGeneration>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_remote(
        &self,
        request: &GenerationRequest,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> GenerationOutcome {
        let channel = match self.context.remote.as_ref().filter(|c| c.is_connected()) {
            Some(channel) => channel.clone(),
            None => return fail(sink, DispatchError::RemoteUnavailable.to_string()),
        };

        info!(
            "Dispatching generation to remote provider {} (model {})",
            request.provider, request.model
        );

        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                channel.stop_generation();
                return GenerationOutcome::Cancelled;
            }
            started = channel.start_chat(RemoteChatRequest::from(request)) => started,
        };
        let mut events = match started {
            Ok(rx) => ReceiverStream::new(rx),
            Err(e) => return fail(sink, e.to_string()),
        };

        let mut started_calls: HashMap<String, ToolCall> = HashMap::new();
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Remote generation cancelled, signalling stop");
                    channel.stop_generation();
                    return GenerationOutcome::Cancelled;
                }
                event = events.next() => event,
            };

            match event {
                None => {
                    warn!("Remote provider closed its event stream early");
                    return fail(
                        sink,
                        "Remote provider closed the stream before completion".to_string(),
                    );
                }
                Some(RemoteEvent::Token { content, thinking }) => {
                    sink.emit(GenerationEvent::Token {
                        content,
                        thinking: thinking.unwrap_or_default(),
                    });
                }
                Some(RemoteEvent::ToolStart { id, name, args }) => {
                    let call = ToolCall {
                        id: id.clone(),
                        name,
                        args,
                        status: ToolCallStatus::Running,
                        result: None,
                        error: None,
                    };
                    started_calls.insert(id, call.clone());
                    sink.emit(GenerationEvent::ToolCall(call));
                }
                Some(RemoteEvent::ToolDone {
                    id,
                    name,
                    result,
                    error,
                    status,
                }) => {
                    let started = started_calls.remove(&id);
                    let call = ToolCall {
                        name: name
                            .or_else(|| started.as_ref().map(|c| c.name.clone()))
                            .unwrap_or_default(),
                        args: started.map(|c| c.args).unwrap_or_default(),
                        id,
                        status,
                        result,
                        error,
                    };
                    sink.emit(GenerationEvent::ToolCall(call));
                }
                Some(RemoteEvent::Done {
                    content,
                    thinking,
                    usage,
                }) => {
                    let thinking = thinking.unwrap_or_default();
                    sink.emit(GenerationEvent::Done {
                        content: content.clone(),
                        thinking: thinking.clone(),
                    });
                    if let Some(usage) = usage {
                        sink.emit(GenerationEvent::Usage(usage));
                    }
                    return GenerationOutcome::Completed { content, thinking };
                }
                Some(RemoteEvent::Error { message }) => return fail(sink, message),
            }
        }
    }
}

fn fail(sink: &EventSink, message: String) -> GenerationOutcome {
    sink.emit(GenerationEvent::Error(message.clone()));
    GenerationOutcome::Failed(message)
}
