//! Dispatch event bus: trait for emitting audit events from a run.
//!
//! The engine accepts an `Arc<dyn EventSink>` and reports run lifecycle and
//! per-target outcomes through it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchEventType {
    RunStarted,
    SessionEstablished,
    AuthenticationFailed,
    MessageSent,
    MessageFailed,
    SessionLost,
    RunCompleted,
    RunAborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchEvent {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub event_type: DispatchEventType,
    pub target: Option<String>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Trait for emitting dispatch events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DispatchEvent);
}

/// No-op sink for callers that don't need events.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: DispatchEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<DispatchEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events.lock().expect("event bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event bus mutex poisoned").len()
    }

    pub fn count_type(&self, event_type: DispatchEventType) -> usize {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: DispatchEvent) {
        self.events.lock().expect("event bus mutex poisoned").push(event);
    }
}

pub fn make_event(
    event_type: DispatchEventType,
    run_id: Uuid,
    target: Option<String>,
    detail: Option<String>,
) -> DispatchEvent {
    DispatchEvent {
        event_id: Uuid::new_v4(),
        run_id,
        event_type,
        target,
        detail,
        timestamp: Utc::now(),
    }
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        let run_id = Uuid::new_v4();
        assert_eq!(sink.count(), 0);

        sink.emit(make_event(DispatchEventType::RunStarted, run_id, None, None));
        sink.emit(make_event(
            DispatchEventType::MessageSent,
            run_id,
            Some("alice".into()),
            None,
        ));
        sink.emit(make_event(
            DispatchEventType::MessageFailed,
            run_id,
            Some("bob".into()),
            Some("Usuario no encontrado".into()),
        ));

        assert_eq!(sink.count(), 3);
        assert_eq!(sink.count_type(DispatchEventType::MessageSent), 1);
        assert_eq!(sink.events()[2].target.as_deref(), Some("bob"));
        assert!(sink.events().iter().all(|e| e.run_id == run_id));
    }

    #[test]
    fn test_noop_sink_accepts_events() {
        let sink = noop_sink();
        sink.emit(make_event(DispatchEventType::RunCompleted, Uuid::new_v4(), None, None));
    }
}
