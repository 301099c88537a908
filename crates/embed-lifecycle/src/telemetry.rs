//! Structured lifecycle events and the host-supplied observer hook.
//!
//! Every transition, ignored callback, recovery decision and fallback is
//! recorded as an [`EmbedEvent`]. Events are buffered for `drain_events` and
//! also handed to an optional [`EmbedObserver`] as they happen; the core never
//! performs I/O on its own.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EmbedError;
use crate::generation::{GenerationId, GenerationState, OrchestratorId};

pub const COMPONENT: &str = "embed_lifecycle";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedEvent {
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub component: String,
    pub orchestrator_id: OrchestratorId,
    pub generation: Option<GenerationId>,
    pub event: String,
    pub outcome: String,
    pub error_code: Option<String>,
    pub from_state: Option<GenerationState>,
    pub to_state: Option<GenerationState>,
    pub detail: Option<String>,
}

impl EmbedEvent {
    pub fn new(orchestrator_id: OrchestratorId, event: &str, outcome: &str) -> Self {
        Self {
            sequence: 0,
            timestamp_ms: 0,
            component: COMPONENT.to_string(),
            orchestrator_id,
            generation: None,
            event: event.to_string(),
            outcome: outcome.to_string(),
            error_code: None,
            from_state: None,
            to_state: None,
            detail: None,
        }
    }

    pub fn generation(mut self, generation: GenerationId) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn states(mut self, from: GenerationState, to: GenerationState) -> Self {
        self.from_state = Some(from);
        self.to_state = Some(to);
        self
    }

    pub fn error(mut self, error: &EmbedError) -> Self {
        self.error_code = Some(error.error_code().to_string());
        self.detail = Some(error.to_string());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Host-supplied hook that sees each event as it is emitted.
pub trait EmbedObserver {
    fn observe(&mut self, event: &EmbedEvent);
}

impl<F: FnMut(&EmbedEvent)> EmbedObserver for F {
    fn observe(&mut self, event: &EmbedEvent) {
        self(event);
    }
}

/// Sequenced event buffer with an optional observer.
#[derive(Default)]
pub struct EventRecorder {
    next_sequence: u64,
    events: Vec<EmbedEvent>,
    observer: Option<Box<dyn EmbedObserver>>,
}

impl fmt::Debug for EventRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRecorder")
            .field("next_sequence", &self.next_sequence)
            .field("buffered", &self.events.len())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_observer(&mut self, observer: Box<dyn EmbedObserver>) {
        self.observer = Some(observer);
    }

    pub fn emit(&mut self, timestamp_ms: u64, mut event: EmbedEvent) {
        event.sequence = self.next_sequence;
        event.timestamp_ms = timestamp_ms;
        self.next_sequence += 1;
        if let Some(observer) = self.observer.as_mut() {
            observer.observe(&event);
        }
        self.events.push(event);
    }

    pub fn events(&self) -> &[EmbedEvent] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<EmbedEvent> {
        std::mem::take(&mut self.events)
    }

    /// Total events emitted, including drained ones.
    pub fn emitted(&self) -> u64 {
        self.next_sequence
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn sequences_survive_drain() {
        let mut rec = EventRecorder::new();
        rec.emit(10, EmbedEvent::new(OrchestratorId(1), "mount", "ok"));
        rec.emit(20, EmbedEvent::new(OrchestratorId(1), "remount", "ok"));
        let first = rec.drain();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].sequence, 1);
        assert_eq!(first[1].timestamp_ms, 20);
        rec.emit(30, EmbedEvent::new(OrchestratorId(1), "unmount", "ok"));
        assert_eq!(rec.events()[0].sequence, 2);
        assert_eq!(rec.emitted(), 3);
    }

    #[test]
    fn observer_sees_every_event() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut rec = EventRecorder::new();
        rec.set_observer(Box::new(move |event: &EmbedEvent| {
            sink.borrow_mut().push(event.event.clone());
        }));
        rec.emit(0, EmbedEvent::new(OrchestratorId(0), "a", "ok"));
        rec.emit(0, EmbedEvent::new(OrchestratorId(0), "b", "ok"));
        assert_eq!(*seen.borrow(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn error_sets_code_and_detail() {
        let err = EmbedError::ContainerMissingRace {
            generation: GenerationId(2),
        };
        let event = EmbedEvent::new(OrchestratorId(0), "poll_tick", "ignored").error(&err);
        assert_eq!(event.error_code.as_deref(), Some("EMBED_CONTAINER_MISSING"));
        assert!(event.detail.unwrap().contains("generation 2"));
        assert_eq!(event.component, COMPONENT);
    }

    #[test]
    fn event_serializes_snake_case_states() {
        let event = EmbedEvent::new(OrchestratorId(3), "transition", "ok")
            .generation(GenerationId(1))
            .states(GenerationState::ScriptLoading, GenerationState::Polling);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["from_state"], "script_loading");
        assert_eq!(json["orchestrator_id"], 3);
    }
}
