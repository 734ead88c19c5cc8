//! Message bubbles for one streamed generation
//!
//! A generation writes into the transcript as it goes: the streaming
//! assistant bubble receives token snapshots, tool calls go into a tool
//! bubble placed after it, and once a tool call settles a fresh assistant
//! bubble is opened for the next round.

use agentloom_core::{Message, Role, ToolCall};

use crate::llm::events::GenerationEvent;

/// Tracks which transcript entries the current generation writes to
#[derive(Debug)]
pub struct BubbleTracker {
    assistant: usize,
    tool: Option<usize>,
}

impl BubbleTracker {
    /// Push a streaming assistant bubble onto `messages` and track it
    pub fn open(messages: &mut Vec<Message>) -> Self {
        messages.push(Message::streaming(Role::Assistant));
        Self {
            assistant: messages.len() - 1,
            tool: None,
        }
    }

    pub fn assistant_index(&self) -> usize {
        self.assistant
    }

    /// Apply one generation event; returns the indices that changed
    pub fn apply(&mut self, messages: &mut Vec<Message>, event: &GenerationEvent) -> Vec<usize> {
        match event {
            GenerationEvent::Token { content, thinking } => {
                if self.tool.map_or(false, |tool| self.assistant > tool) {
                    self.tool = None;
                }
                let bubble = &mut messages[self.assistant];
                bubble.content = content.clone();
                bubble.thinking = Some(thinking.clone()).filter(|t| !t.is_empty());
                vec![self.assistant]
            }
            GenerationEvent::ToolCall(call) => self.apply_tool_call(messages, call),
            GenerationEvent::Done { content, thinking } => {
                let bubble = &mut messages[self.assistant];
                bubble.content = content.clone();
                bubble.thinking = Some(thinking.clone()).filter(|t| !t.is_empty());
                bubble.is_streaming = false;
                vec![self.assistant]
            }
            GenerationEvent::Error(error) => {
                let bubble = &mut messages[self.assistant];
                bubble.error = Some(error.clone());
                bubble.is_streaming = false;
                vec![self.assistant]
            }
            GenerationEvent::Usage(_) => Vec::new(),
        }
    }

    fn apply_tool_call(&mut self, messages: &mut Vec<Message>, call: &ToolCall) -> Vec<usize> {
        let mut changed = Vec::new();

        let tool = match self.tool {
            Some(tool) => tool,
            None => {
                messages[self.assistant].is_streaming = false;
                changed.push(self.assistant);
                let mut bubble = Message::tool_results(Vec::new());
                bubble.is_streaming = true;
                messages.insert(self.assistant + 1, bubble);
                self.tool = Some(self.assistant + 1);
                self.assistant + 1
            }
        };

        let calls = &mut messages[tool].tool_calls;
        match calls.iter_mut().find(|c| c.id == call.id) {
            Some(existing) => *existing = call.clone(),
            None => calls.push(call.clone()),
        }
        messages[tool].is_streaming = !calls.iter().all(|c| c.status.is_terminal());
        changed.push(tool);

        if call.status.is_terminal() && self.assistant < tool {
            messages.insert(tool + 1, Message::streaming(Role::Assistant));
            self.assistant = tool + 1;
            changed.push(self.assistant);
        }
        changed
    }

    /// Close the generation: nothing stays streaming and an untouched
    /// trailing assistant bubble is removed
    pub fn finish(self, messages: &mut Vec<Message>) -> Option<usize> {
        if let Some(tool) = self.tool {
            messages[tool].is_streaming = false;
        }
        let bubble = &mut messages[self.assistant];
        bubble.is_streaming = false;
        let untouched = bubble.content.is_empty() && bubble.thinking.is_none() && bubble.error.is_none();
        if untouched && self.assistant > 0 && messages[self.assistant - 1].role == Role::Tool {
            messages.remove(self.assistant);
            return None;
        }
        Some(self.assistant)
    }
}
