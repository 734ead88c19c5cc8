//! Per-turn loop state
//!
//! ```text
//! GENERATING --(no tool calls)--> DONE
//! GENERATING --(tool calls)-----> INVOKING --> GENERATING (next round)
//! GENERATING --(round cap hit)--> DONE
//! ```

use agentloom_core::{Message, ToolCall};
use tracing::warn;

use crate::llm::adapters::{RequestedToolCall, RoundOutput};

/// Loop phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Generating,
    Invoking,
    Done,
}

/// Next step after a finished round
#[derive(Debug, Clone, PartialEq)]
pub enum LoopAction {
    /// Emit final content and stop
    Complete { content: String, thinking: String },
    /// Run these calls, then generate again
    InvokeTools(Vec<RequestedToolCall>),
}

/// Loop state for one generate call
#[derive(Debug, Clone)]
pub struct LoopState {
    /// Rounds started so far (1-indexed once running)
    pub iteration: usize,
    pub max_iterations: usize,
    pub phase: LoopPhase,
    /// Original messages plus synthesized assistant and tool messages
    pub messages: Vec<Message>,
}

impl LoopState {
    pub fn new(messages: Vec<Message>, max_iterations: usize) -> Self {
        Self {
            iteration: 0,
            max_iterations: max_iterations.max(1),
            phase: LoopPhase::Generating,
            messages,
        }
    }

    pub fn begin_round(&mut self) {
        self.iteration += 1;
        self.phase = LoopPhase::Generating;
    }

    /// Decide what follows a finished round
    ///
    /// Pending tool calls on the last allowed round are dropped and the
    /// round's content becomes final.
    pub fn decide(&mut self, output: &RoundOutput) -> LoopAction {
        if output.tool_calls.is_empty() {
            self.phase = LoopPhase::Done;
            return self.complete(output);
        }
        if self.iteration >= self.max_iterations {
            warn!(
                "Tool loop hit max iterations ({}); dropping {} pending tool call(s)",
                self.max_iterations,
                output.tool_calls.len()
            );
            self.phase = LoopPhase::Done;
            return self.complete(output);
        }
        self.phase = LoopPhase::Invoking;
        LoopAction::InvokeTools(output.tool_calls.clone())
    }

    fn complete(&self, output: &RoundOutput) -> LoopAction {
        LoopAction::Complete {
            content: output.content.clone(),
            thinking: output.thinking.clone(),
        }
    }

    /// Append the round's assistant message and one tool message per call
    pub fn record_round(&mut self, content: &str, thinking: &str, calls: Vec<ToolCall>) {
        let mut assistant = Message::assistant(content);
        if !thinking.is_empty() {
            assistant.thinking = Some(thinking.to_string());
        }
        assistant.tool_calls = calls.clone();
        self.messages.push(assistant);

        for call in calls {
            self.messages.push(Message::tool_results(vec![call]));
        }
        self.phase = LoopPhase::Generating;
    }
}
