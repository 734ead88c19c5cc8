//! Chat session
//!
//! One conversation with its own dispatcher, approval gate, planner and
//! orchestrator, all sharing a single [`EngineContext`]. Nothing here is
//! process-global: two sessions never see each other's plans or
//! generations.

mod bubbles;

use std::sync::Arc;

use agentloom_core::{Attachment, ChatMode, Message, Role, Usage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::llm::approval::ApprovalGate;
use crate::llm::context::EngineContext;
use crate::llm::dispatcher::GenerationDispatcher;
use crate::llm::events::{EventSink, GenerationEvent};
use crate::llm::orchestrator::{OrchestrationEngine, OrchestrationEvent};
use crate::llm::planner::{PlanError, PlanningEngine};
use crate::llm::request::{GenerationOutcome, GenerationRequest};

pub use bubbles::BubbleTracker;

pub const PLAN_REJECTED: &str = "Plan rejected.";
pub const EXECUTION_COMPLETE: &str = "Agent execution complete.";
pub const PLANNING_PLACEHOLDER: &str = "Planning...";

/// Transcript change notifications
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    MessageAdded(Message),
    MessageUpdated(Message),
    MessageRemoved(String),
    Usage(Usage),
}

/// Stops whatever the session is doing from another task
#[derive(Debug, Clone)]
pub struct StopHandle {
    dispatcher: Arc<GenerationDispatcher>,
    planner: Arc<PlanningEngine>,
    orchestrator: Arc<OrchestrationEngine>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.dispatcher.stop();
        self.planner.stop();
        self.orchestrator.stop();
    }
}

pub struct ChatSession {
    context: EngineContext,
    messages: Vec<Message>,
    system_prompt: Option<String>,
    usage: Option<Usage>,
    dispatcher: Arc<GenerationDispatcher>,
    planner: Arc<PlanningEngine>,
    gate: Arc<ApprovalGate>,
    orchestrator: Arc<OrchestrationEngine>,
    observer: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("context", &self.context)
            .field("messages", &self.messages.len())
            .field("usage", &self.usage)
            .finish()
    }
}

impl ChatSession {
    pub fn new(context: EngineContext) -> Self {
        Self::build(context, None)
    }

    /// Session whose orchestrator reports progress on `progress`
    pub fn with_progress(context: EngineContext, progress: mpsc::UnboundedSender<OrchestrationEvent>) -> Self {
        Self::build(context, Some(progress))
    }

    fn build(context: EngineContext, progress: Option<mpsc::UnboundedSender<OrchestrationEvent>>) -> Self {
        let gate = Arc::new(ApprovalGate::new());
        let mut orchestrator = OrchestrationEngine::new(context.clone(), gate.clone());
        if let Some(progress) = progress {
            orchestrator = orchestrator.with_progress(progress);
        }
        Self {
            dispatcher: Arc::new(GenerationDispatcher::new(context.clone())),
            planner: Arc::new(PlanningEngine::new(context.clone())),
            orchestrator: Arc::new(orchestrator),
            gate,
            context,
            messages: Vec::new(),
            system_prompt: None,
            usage: None,
            observer: None,
        }
    }

    /// Receive transcript changes
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observer = Some(tx);
        rx
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Replace the transcript, e.g. with history loaded by the caller
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.usage = None;
    }

    pub fn set_system_prompt(&mut self, prompt: Option<String>) {
        self.system_prompt = prompt;
    }

    pub fn approval_gate(&self) -> Arc<ApprovalGate> {
        self.gate.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            dispatcher: self.dispatcher.clone(),
            planner: self.planner.clone(),
            orchestrator: self.orchestrator.clone(),
        }
    }

    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    pub fn is_busy(&self) -> bool {
        self.dispatcher.is_generating() || self.planner.is_planning() || self.orchestrator.is_running()
    }

    /// Tokens reported by the most recent round
    pub fn used_tokens(&self) -> u64 {
        self.usage.map_or(0, |u| u.total())
    }

    /// Fraction of the context window in use, 0.0 to 1.0
    pub fn context_usage(&self) -> f64 {
        let size = self.context.settings.context_size;
        if size == 0 {
            return 0.0;
        }
        (self.used_tokens() as f64 / f64::from(size)).min(1.0)
    }

    /// Last assistant reply that finished
    pub fn last_reply(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.is_streaming)
    }

    /// Send a user message and run it in `mode`
    ///
    /// Returns `false` when there is nothing to send or no model is
    /// configured. Failures end up on the bubble that produced them.
    pub async fn send(&mut self, content: &str, attachments: Vec<Attachment>, mode: ChatMode) -> bool {
        if !self.context.settings.is_configured() {
            warn!("Ignoring message: no model configured");
            return false;
        }
        let content = content.trim();
        if content.is_empty() && attachments.is_empty() {
            return false;
        }
        self.push(Message::user(content).with_attachments(attachments));
        self.run(content.to_string(), mode).await;
        true
    }

    /// Re-run from an earlier user message, dropping everything after it
    pub async fn retry(&mut self, user_message_id: &str, mode: ChatMode) -> bool {
        let Some(index) = self
            .messages
            .iter()
            .position(|m| m.id == user_message_id && m.role == Role::User)
        else {
            return false;
        };

        for removed in self.messages.drain(index + 1..).collect::<Vec<_>>() {
            self.notify(SessionEvent::MessageRemoved(removed.id));
        }
        let content = self.messages[index].content.clone();
        debug!("Retrying from message {}", user_message_id);
        self.run(content, mode).await;
        true
    }

    async fn run(&mut self, content: String, mode: ChatMode) {
        match mode {
            ChatMode::Plan => self.run_plan_mode(&content).await,
            ChatMode::Ask | ChatMode::Agent => {
                self.run_generation(mode).await;
            }
        }
    }

    /// Conversation visible to a model: finished messages only
    fn history(&self) -> Vec<Message> {
        self.messages.iter().filter(|m| !m.is_streaming).cloned().collect()
    }

    async fn run_generation(&mut self, mode: ChatMode) -> GenerationOutcome {
        let settings = self.context.settings.clone();
        let history = self.history();

        let mut bubbles = BubbleTracker::open(&mut self.messages);
        self.notify_added(bubbles.assistant_index());

        let (sink, mut events) = EventSink::channel();
        let request = GenerationRequest::from_settings(&settings, history)
            .with_tools((*self.context.tools).clone())
            .with_system_prompt(settings.effective_system_prompt(self.system_prompt.as_deref()))
            .with_max_iterations(mode.max_iterations(settings.max_iterations))
            .with_events(sink);

        let dispatcher = self.dispatcher.clone();
        let generation = dispatcher.generate(request);
        let consume = async {
            while let Some(event) = events.recv().await {
                if let GenerationEvent::Usage(usage) = &event {
                    self.usage = Some(*usage);
                    self.notify(SessionEvent::Usage(*usage));
                }
                // Bubbles are only ever appended at the tail
                let before = self.messages.len();
                for index in bubbles.apply(&mut self.messages, &event) {
                    if index >= before {
                        self.notify_added(index);
                    } else {
                        self.notify_updated(index);
                    }
                }
            }
        };
        let (outcome, ()) = tokio::join!(generation, consume);

        let last = self.messages.get(bubbles.assistant_index()).map(|m| m.id.clone());
        match bubbles.finish(&mut self.messages) {
            Some(index) => self.notify_updated(index),
            None => {
                if let Some(id) = last {
                    self.notify(SessionEvent::MessageRemoved(id));
                }
            }
        }

        if let GenerationOutcome::Failed(ref error) = outcome {
            warn!("Generation failed: {}", error);
        }
        outcome
    }

    async fn run_plan_mode(&mut self, content: &str) {
        let context_messages = self.history();

        let mut placeholder = Message::streaming(Role::Plan);
        placeholder.content = PLANNING_PLACEHOLDER.to_string();
        let bubble = self.push(placeholder);

        let plan = match self.planner.generate_plan(content, &CancellationToken::new()).await {
            Ok(plan) => plan,
            Err(PlanError::Cancelled) => {
                let removed = self.messages.remove(bubble);
                self.notify(SessionEvent::MessageRemoved(removed.id));
                return;
            }
            Err(e) => {
                let msg = &mut self.messages[bubble];
                msg.is_streaming = false;
                msg.content = String::new();
                msg.error = Some(e.to_string());
                self.notify_updated(bubble);
                return;
            }
        };

        {
            let msg = &mut self.messages[bubble];
            msg.is_streaming = false;
            msg.content = plan.title.clone();
            msg.agent_plan = Some(plan.clone());
        }
        self.notify_updated(bubble);

        let approved = self.gate.wait_for_approval(plan.clone()).await;
        if !approved {
            info!("Plan {} was not approved", plan.id);
            self.push(Message::assistant(PLAN_REJECTED));
            return;
        }

        // Task edits made while pending live on the gate's copy
        let approved_plan = self
            .gate
            .current_plan()
            .filter(|p| p.id == plan.id)
            .unwrap_or(plan);
        let result = self.orchestrator.execute(&approved_plan, &context_messages).await;

        if let Some(executed) = self.gate.current_plan().filter(|p| p.id == approved_plan.id) {
            self.messages[bubble].agent_plan = Some(executed);
            self.notify_updated(bubble);
        }

        let mut reply = Message::new(Role::Agent, "");
        if !result.summary.is_empty() {
            reply.content = result.summary;
        } else if let Some(error) = result.error {
            reply.error = Some(error);
        } else {
            reply.content = EXECUTION_COMPLETE.to_string();
        }
        self.push(reply);
    }

    fn push(&mut self, message: Message) -> usize {
        self.messages.push(message);
        let index = self.messages.len() - 1;
        self.notify_added(index);
        index
    }

    fn notify_added(&self, index: usize) {
        if let Some(msg) = self.messages.get(index) {
            self.notify(SessionEvent::MessageAdded(msg.clone()));
        }
    }

    fn notify_updated(&self, index: usize) {
        if let Some(msg) = self.messages.get(index) {
            self.notify(SessionEvent::MessageUpdated(msg.clone()));
        }
    }

    fn notify(&self, event: SessionEvent) {
        if let Some(tx) = &self.observer {
            let _ = tx.send(event);
        }
    }
}
