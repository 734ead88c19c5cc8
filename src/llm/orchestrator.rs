//! Plan orchestration
//!
//! Executes an approved [`AgentPlan`]: groups in order, the tasks of one
//! group concurrently, each task as an isolated generation seeded with the
//! conversation context plus the task description. A group is a barrier;
//! the next group starts only once every task of the current one settled.
//!
//! A failing task is recorded on its own entry and does not disturb its
//! siblings. `stop()` cancels every running task and prevents further
//! groups from launching.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use agentloom_core::{AgentPlan, AgentTask, Message, TaskPatch, TaskStatus, ToolCall};
use futures::future::join_all;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::llm::approval::ApprovalGate;
use crate::llm::context::EngineContext;
use crate::llm::dispatcher::GenerationDispatcher;
use crate::llm::events::{EventReceiver, EventSink, GenerationEvent};
use crate::llm::request::{GenerationOutcome, GenerationRequest};

/// Separator between task sections in the summary
pub const SUMMARY_SEPARATOR: &str = "\n\n---\n\n";

pub const ALREADY_RUNNING: &str = "An orchestration is already running";

/// Result of one successful task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub task_id: String,
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrchestrationResult {
    /// Successful tasks in group/task order
    pub task_results: Vec<TaskResult>,
    pub summary: String,
    /// Set only when the plan could not be executed at all
    pub error: Option<String>,
}

impl OrchestrationResult {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Live execution progress
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestrationEvent {
    GroupStarted { index: usize, task_ids: Vec<String> },
    TaskStarted { task_id: String },
    TaskUpdated { task_id: String, patch: TaskPatch },
    TaskFinished { task_id: String, status: TaskStatus },
    GroupFinished { index: usize },
}

/// Build the deterministic summary from successful task results
pub fn summarize(results: &[TaskResult]) -> String {
    results
        .iter()
        .map(|r| format!("**{}**\n{}", r.name, r.content))
        .collect::<Vec<_>>()
        .join(SUMMARY_SEPARATOR)
}

pub struct OrchestrationEngine {
    context: EngineContext,
    gate: Arc<ApprovalGate>,
    progress: Option<mpsc::UnboundedSender<OrchestrationEvent>>,
    running: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for OrchestrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationEngine")
            .field("running", &self.is_running())
            .finish()
    }
}

impl OrchestrationEngine {
    pub fn new(context: EngineContext, gate: Arc<ApprovalGate>) -> Self {
        Self {
            context,
            gate,
            progress: None,
            running: AtomicBool::new(false),
            cancel: Mutex::new(None),
        }
    }

    /// Report progress events on `tx`
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<OrchestrationEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Cancel the running execution, if any
    ///
    /// Once `is_running()` reports true the stop is guaranteed to land. An
    /// idle engine ignores it, since session-wide stops reach every engine.
    pub fn stop(&self) {
        let slot = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = slot.as_ref() {
            info!("Stopping orchestration");
            token.cancel();
        }
    }

    /// Execute `plan` with `context_messages` as every task's history
    pub async fn execute(&self, plan: &AgentPlan, context_messages: &[Message]) -> OrchestrationResult {
        // The token is published under the same lock that claims the run,
        // so a concurrent stop() always finds it
        let cancel = {
            let mut slot = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            if self.running.swap(true, Ordering::SeqCst) {
                warn!("Refusing to execute plan {}: {}", plan.id, ALREADY_RUNNING);
                return OrchestrationResult::failed(ALREADY_RUNNING);
            }
            let cancel = CancellationToken::new();
            *slot = Some(cancel.clone());
            cancel
        };

        let result = self.run_groups(plan, context_messages, &cancel).await;

        {
            let mut slot = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            *slot = None;
            self.running.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn run_groups(
        &self,
        plan: &AgentPlan,
        context_messages: &[Message],
        cancel: &CancellationToken,
    ) -> OrchestrationResult {
        info!(
            "Executing plan '{}' ({} groups, {} tasks)",
            plan.title,
            plan.parallel_groups.len(),
            plan.task_count()
        );
        self.gate.mark_running(&plan.id);

        let limit = self
            .context
            .settings
            .max_parallel_tasks
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        let mut task_results = Vec::new();

        for (index, group) in plan.parallel_groups.iter().enumerate() {
            if cancel.is_cancelled() {
                for task in group {
                    self.finish_task(&plan.id, task, TaskPatch::status(TaskStatus::Skipped));
                }
                continue;
            }

            debug!("Starting group {} ({} tasks)", index, group.len());
            self.report(OrchestrationEvent::GroupStarted {
                index,
                task_ids: group.iter().map(|t| t.id.clone()).collect(),
            });

            let settled = join_all(group.iter().map(|task| {
                self.run_task(&plan.id, task, context_messages, cancel.child_token(), limit.clone())
            }))
            .await;

            for (task, content) in group.iter().zip(settled) {
                if let Some(content) = content {
                    task_results.push(TaskResult {
                        task_id: task.id.clone(),
                        name: task.name.clone(),
                        content,
                    });
                }
            }

            self.report(OrchestrationEvent::GroupFinished { index });
            debug!("Group {} settled", index);
        }

        self.gate.mark_completed(&plan.id);
        if cancel.is_cancelled() {
            info!("Plan '{}' stopped after {} task result(s)", plan.title, task_results.len());
        } else {
            info!("Plan '{}' finished with {} task result(s)", plan.title, task_results.len());
        }

        OrchestrationResult {
            summary: summarize(&task_results),
            task_results,
            error: None,
        }
    }

    /// Run one task to a terminal status; `Some(content)` on success
    async fn run_task(
        &self,
        plan_id: &str,
        task: &AgentTask,
        context_messages: &[Message],
        cancel: CancellationToken,
        limit: Option<Arc<Semaphore>>,
    ) -> Option<String> {
        let _permit = match limit {
            Some(limit) => {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = limit.acquire_owned() => permit.ok(),
                };
                if permit.is_none() {
                    self.finish_task(plan_id, task, TaskPatch::status(TaskStatus::Skipped));
                    return None;
                }
                permit
            }
            None => None,
        };
        if cancel.is_cancelled() {
            self.finish_task(plan_id, task, TaskPatch::status(TaskStatus::Skipped));
            return None;
        }

        self.patch_task(plan_id, &task.id, TaskPatch::status(TaskStatus::Running));
        self.report(OrchestrationEvent::TaskStarted {
            task_id: task.id.clone(),
        });

        let settings = &self.context.settings;
        let mut messages = context_messages.to_vec();
        messages.push(Message::user(task.description.clone()));

        let (sink, events) = EventSink::channel();
        let request = GenerationRequest::from_settings(settings, messages)
            .with_tools((*self.context.tools).clone())
            .with_system_prompt(settings.effective_system_prompt(task.system_prompt.as_deref()))
            .with_cancel(cancel)
            .with_events(sink);

        let dispatcher = GenerationDispatcher::new(self.context.clone());
        let (outcome, ()) = tokio::join!(
            dispatcher.generate(request),
            self.track_progress(plan_id, &task.id, events)
        );

        match outcome {
            GenerationOutcome::Completed { content, .. } => {
                debug!("Task '{}' succeeded", task.name);
                self.finish_task(
                    plan_id,
                    task,
                    TaskPatch::status(TaskStatus::Success).with_result(content.clone()),
                );
                Some(content)
            }
            GenerationOutcome::Failed(error) => {
                warn!("Task '{}' failed: {}", task.name, error);
                self.finish_task(plan_id, task, TaskPatch::status(TaskStatus::Error).with_error(error));
                None
            }
            GenerationOutcome::Cancelled => {
                debug!("Task '{}' cancelled", task.name);
                self.finish_task(plan_id, task, TaskPatch::status(TaskStatus::Skipped));
                None
            }
        }
    }

    /// Mirror the task's partial result and tool calls onto the plan
    ///
    /// Tool calls are upserted by call id.
    async fn track_progress(&self, plan_id: &str, task_id: &str, mut events: EventReceiver) {
        let mut calls: Vec<ToolCall> = Vec::new();
        let mut partial = String::new();
        while let Some(event) = events.recv().await {
            match event {
                GenerationEvent::Token { content, .. } if content != partial => {
                    partial = content;
                    self.patch_task(plan_id, task_id, TaskPatch::default().with_result(partial.clone()));
                }
                GenerationEvent::ToolCall(call) => {
                    match calls.iter_mut().find(|c| c.id == call.id) {
                        Some(existing) => *existing = call,
                        None => calls.push(call),
                    }
                    self.patch_task(plan_id, task_id, TaskPatch::default().with_tool_calls(calls.clone()));
                }
                _ => {}
            }
        }
    }

    fn finish_task(&self, plan_id: &str, task: &AgentTask, patch: TaskPatch) {
        let status = patch.status.unwrap_or(TaskStatus::Skipped);
        self.patch_task(plan_id, &task.id, patch);
        self.report(OrchestrationEvent::TaskFinished {
            task_id: task.id.clone(),
            status,
        });
    }

    fn patch_task(&self, plan_id: &str, task_id: &str, patch: TaskPatch) {
        self.gate.update_task(plan_id, task_id, &patch);
        self.report(OrchestrationEvent::TaskUpdated {
            task_id: task_id.to_string(),
            patch,
        });
    }

    fn report(&self, event: OrchestrationEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }
}
