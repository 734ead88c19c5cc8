//! Generation events
//!
//! Events flow from a running generation to its caller over an unbounded
//! tokio channel. Within one generation they arrive in stream order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use agentloom_core::{ToolCall, Usage};
use tokio::sync::mpsc;

/// Event emitted by a generation
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// Accumulated visible content and thinking so far in this round
    Token { content: String, thinking: String },
    /// A tool call changed status (pending, running, success, error)
    ToolCall(ToolCall),
    /// Generation finished with final content
    Done { content: String, thinking: String },
    /// Generation failed
    Error(String),
    /// Token accounting for a round
    Usage(Usage),
}

impl GenerationEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationEvent::Done { .. } | GenerationEvent::Error(_))
    }
}

/// Channel receiver for generation events
pub type EventReceiver = mpsc::UnboundedReceiver<GenerationEvent>;

#[derive(Debug, Clone)]
struct EpochGate {
    current: Arc<AtomicU64>,
    epoch: u64,
}

/// Where a generation sends its events
///
/// A gated sink stops delivering as soon as its owner moves to a new epoch,
/// so events from a stopped generation never reach the caller.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<GenerationEvent>>,
    gate: Option<EpochGate>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<GenerationEvent>) -> Self {
        Self {
            tx: Some(tx),
            gate: None,
        }
    }

    /// Sink plus the receiver for its events
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Sink that drops everything
    pub fn discard() -> Self {
        Self::default()
    }

    /// Copy of this sink that only delivers while `current == epoch`
    pub(crate) fn gated(&self, current: Arc<AtomicU64>, epoch: u64) -> Self {
        Self {
            tx: self.tx.clone(),
            gate: Some(EpochGate { current, epoch }),
        }
    }

    /// Whether events are still delivered
    pub fn is_live(&self) -> bool {
        match &self.gate {
            Some(gate) => gate.current.load(Ordering::SeqCst) == gate.epoch,
            None => true,
        }
    }

    pub fn emit(&self, event: GenerationEvent) {
        if !self.is_live() {
            return;
        }
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is listening any more
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gated_sink_stops_after_epoch_change() {
        let (sink, mut rx) = EventSink::channel();
        let epoch = Arc::new(AtomicU64::new(1));
        let gated = sink.gated(epoch.clone(), 1);

        gated.emit(GenerationEvent::Error("first".into()));
        epoch.fetch_add(1, Ordering::SeqCst);
        gated.emit(GenerationEvent::Error("second".into()));
        drop((sink, gated));

        assert_eq!(rx.try_recv().unwrap(), GenerationEvent::Error("first".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_terminal_events() {
        assert!(GenerationEvent::Error("x".into()).is_terminal());
        assert!(!GenerationEvent::Usage(Usage::default()).is_terminal());
    }

    #[test]
    fn test_discard_sink() {
        let sink = EventSink::discard();
        assert!(sink.is_live());
        sink.emit(GenerationEvent::Error("dropped".into()));
    }
}
