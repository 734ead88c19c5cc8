//! Planning engine
//!
//! Turns a free-text request into an [`AgentPlan`] with one tool-free,
//! single-round generation. The model's JSON is parsed strictly: anything
//! that is not a JSON object with a `parallelGroups` array of arrays is an
//! error carrying the start of the raw output.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use agentloom_core::{AgentPlan, AgentTask, Message};
use regex::Regex;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::llm::context::EngineContext;
use crate::llm::dispatcher::GenerationDispatcher;
use crate::llm::request::{GenerationOutcome, GenerationRequest};

/// Characters of raw model output kept in parse errors
pub const RAW_PREVIEW_CHARS: usize = 500;

pub const DEFAULT_TASK_NAME: &str = "Task";
pub const DEFAULT_PLAN_TITLE: &str = "Execution plan";

/// Fixed instruction prompt for plan generation
pub const PLANNING_SYSTEM_PROMPT: &str = r#"You are a planning assistant. Given a user request, decompose it into a precise execution plan.

Respond ONLY with a valid JSON object (no markdown fences, no explanation) matching this schema:

{
  "title": "<short human-readable title of the overall task>",
  "parallelGroups": [
    [
      {
        "name": "<short task name>",
        "description": "<detailed instructions for the sub-agent handling this task>",
        "systemPrompt": "<optional override system prompt for this sub-agent, or omit>"
      }
    ]
  ]
}

Rules:
- Tasks in the SAME group run IN PARALLEL. Put tasks together only when they are truly independent.
- Groups run SEQUENTIALLY in array order. Use a later group when a task depends on earlier results.
- Each task description must be self-contained: it is sent to a separate agent that sees nothing else.
- Aim for 2-6 tasks in total and do not over-decompose simple requests.
- If the request can be handled in a single step, use one group with one task."#;

/// Errors from plan generation and parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("{0}")]
    Generation(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Failed to parse plan JSON: {reason}\n\nRaw: {raw}")]
    JsonParse { reason: String, raw: String },

    #[error("Plan JSON missing parallelGroups array\n\nRaw: {raw}")]
    MissingGroups { raw: String },
}

fn raw_preview(raw: &str) -> String {
    raw.chars().take(RAW_PREVIEW_CHARS).collect()
}

fn fence_patterns() -> Option<&'static (Regex, Regex)> {
    static PATTERNS: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some((
                Regex::new(r"(?i)^```(?:json)?\s*").ok()?,
                Regex::new(r"\s*```\s*$").ok()?,
            ))
        })
        .as_ref()
}

/// Strip an optional surrounding code fence
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    match fence_patterns() {
        Some((open, close)) => {
            let without_open = open.replace(trimmed, "");
            close.replace(&without_open, "").trim().to_string()
        }
        None => trimmed.to_string(),
    }
}

/// Parse model output into a fresh pending plan
///
/// Every task gets a new identifier and `pending` status whatever the model
/// sent. Missing names and titles get defaults; structural problems are
/// errors.
pub fn parse_plan(raw: &str) -> Result<AgentPlan, PlanError> {
    let cleaned = strip_code_fences(raw);
    let parse_error = |reason: String| PlanError::JsonParse {
        reason,
        raw: raw_preview(raw),
    };

    let json: JsonValue = serde_json::from_str(&cleaned).map_err(|e| parse_error(e.to_string()))?;
    let object = json
        .as_object()
        .ok_or_else(|| parse_error("expected a JSON object".to_string()))?;

    let groups = object
        .get("parallelGroups")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| PlanError::MissingGroups {
            raw: raw_preview(raw),
        })?;

    let mut parallel_groups = Vec::with_capacity(groups.len());
    for (gi, group) in groups.iter().enumerate() {
        let entries = group
            .as_array()
            .ok_or_else(|| parse_error(format!("parallelGroups[{}] is not an array", gi)))?;

        let mut tasks = Vec::with_capacity(entries.len());
        for (ti, entry) in entries.iter().enumerate() {
            let fields = entry.as_object().ok_or_else(|| {
                parse_error(format!("parallelGroups[{}][{}] is not an object", gi, ti))
            })?;
            let text = |key: &str| fields.get(key).and_then(JsonValue::as_str).map(str::to_string);

            tasks.push(
                AgentTask::new(
                    text("name").unwrap_or_else(|| DEFAULT_TASK_NAME.to_string()),
                    text("description").unwrap_or_default(),
                )
                .with_system_prompt(text("systemPrompt")),
            );
        }
        parallel_groups.push(tasks);
    }

    let title = object
        .get("title")
        .and_then(JsonValue::as_str)
        .unwrap_or(DEFAULT_PLAN_TITLE);

    Ok(AgentPlan::new(title, parallel_groups))
}

/// Generates plans through its own dispatcher
#[derive(Debug)]
pub struct PlanningEngine {
    dispatcher: GenerationDispatcher,
    planning: AtomicBool,
}

impl PlanningEngine {
    pub fn new(context: EngineContext) -> Self {
        Self {
            dispatcher: GenerationDispatcher::new(context),
            planning: AtomicBool::new(false),
        }
    }

    pub fn is_planning(&self) -> bool {
        self.planning.load(Ordering::SeqCst)
    }

    /// Abort an in-flight plan generation
    pub fn stop(&self) {
        self.dispatcher.stop();
    }

    /// Ask the model to decompose `user_text` into a plan
    pub async fn generate_plan(
        &self,
        user_text: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentPlan, PlanError> {
        if cancel.is_cancelled() {
            return Err(PlanError::Cancelled);
        }

        let settings = &self.dispatcher.context().settings;
        let request = GenerationRequest::from_settings(settings, vec![Message::user(user_text)])
            .with_system_prompt(Some(PLANNING_SYSTEM_PROMPT.to_string()))
            .with_tools(Vec::new())
            .with_max_iterations(1)
            .with_cancel(cancel.clone());

        self.planning.store(true, Ordering::SeqCst);
        debug!("Generating plan ({} chars of input)", user_text.len());
        let outcome = self.dispatcher.generate(request).await;
        self.planning.store(false, Ordering::SeqCst);

        let raw = match outcome {
            GenerationOutcome::Completed { content, .. } => content,
            GenerationOutcome::Failed(e) => return Err(PlanError::Generation(e)),
            GenerationOutcome::Cancelled => return Err(PlanError::Cancelled),
        };

        match parse_plan(&raw) {
            Ok(plan) => {
                info!(
                    "Generated plan '{}' ({} groups, {} tasks)",
                    plan.title,
                    plan.parallel_groups.len(),
                    plan.task_count()
                );
                Ok(plan)
            }
            Err(e) => {
                warn!("Plan output rejected: {}", e.to_string().lines().next().unwrap_or_default());
                Err(e)
            }
        }
    }
}
