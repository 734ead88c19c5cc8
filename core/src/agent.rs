//! Agent plans and tasks
//!
//! A plan is an ordered list of task groups. Groups run one after another,
//! tasks inside a group run concurrently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::ToolCall;

/// Task lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Error,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Error | TaskStatus::Skipped
        )
    }
}

/// Plan lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Pending,
    Approved,
    Running,
    Completed,
    Rejected,
}

/// One unit of work executed by an isolated sub-session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTask {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentTask {
    /// Fresh pending task with a new identifier
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            system_prompt: None,
            status: TaskStatus::Pending,
            result: String::new(),
            tool_calls: Vec::new(),
            error: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    /// Apply a partial update
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(ref result) = patch.result {
            self.result = result.clone();
        }
        if let Some(ref calls) = patch.tool_calls {
            self.tool_calls = calls.clone();
        }
        if let Some(ref error) = patch.error {
            self.error = Some(error.clone());
        }
        if let Some(ref name) = patch.name {
            self.name = name.clone();
        }
        if let Some(ref description) = patch.description {
            self.description = description.clone();
        }
    }
}

/// Partial update to an [`AgentTask`]; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub result: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub error: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(calls);
        self
    }
}

/// A decomposed execution plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPlan {
    pub id: String,
    pub title: String,
    pub parallel_groups: Vec<Vec<AgentTask>>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
}

impl AgentPlan {
    pub fn new(title: impl Into<String>, parallel_groups: Vec<Vec<AgentTask>>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            parallel_groups,
            status: PlanStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn task_count(&self) -> usize {
        self.parallel_groups.iter().map(Vec::len).sum()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &AgentTask> {
        self.parallel_groups.iter().flatten()
    }

    pub fn find_task(&self, task_id: &str) -> Option<&AgentTask> {
        self.tasks().find(|t| t.id == task_id)
    }

    pub fn find_task_mut(&mut self, task_id: &str) -> Option<&mut AgentTask> {
        self.parallel_groups
            .iter_mut()
            .flatten()
            .find(|t| t.id == task_id)
    }
}

/// How a user message is handled by the chat session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Single generation round, tools may be requested but are not looped on
    Ask,
    /// Plan, approve, orchestrate
    Plan,
    /// Full tool loop
    #[default]
    Agent,
}

impl ChatMode {
    /// Iteration cap for the tool loop in this mode
    pub fn max_iterations(&self, configured: usize) -> usize {
        match self {
            ChatMode::Ask => 1,
            ChatMode::Plan | ChatMode::Agent => configured.max(1),
        }
    }
}

impl std::str::FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ask" => Ok(ChatMode::Ask),
            "plan" => Ok(ChatMode::Plan),
            "agent" => Ok(ChatMode::Agent),
            other => Err(format!("Unknown chat mode: {}", other)),
        }
    }
}
