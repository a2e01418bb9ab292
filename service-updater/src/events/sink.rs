//! Event sink trait and implementations.

use tracing::{debug, info, Level};

use super::UpdaterEvent;

/// Receives progress notifications for UI observers.
///
/// Emission never fails the caller; implementations swallow their own errors.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    fn emit(&self, event: &UpdaterEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &UpdaterEvent) {}
}

/// Writes every event to the tracing subscriber.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at `level`; anything other than DEBUG logs at INFO.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &UpdaterEvent) {
        let data = serde_json::to_string(event).unwrap_or_default();
        if self.level == Level::DEBUG {
            debug!(event_type = %event.kind(), event_data = %data, "Event: {}", event.kind());
        } else {
            info!(event_type = %event.kind(), event_data = %data, "Event: {}", event.kind());
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<UpdaterEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far.
    #[must_use]
    pub fn events(&self) -> Vec<UpdaterEvent> {
        self.events.read().clone()
    }

    /// Events whose [`kind`](UpdaterEvent::kind) equals `kind`.
    #[must_use]
    pub fn of_kind(&self, kind: &str) -> Vec<UpdaterEvent> {
        self.events
            .read()
            .iter()
            .filter(|event| event.kind() == kind)
            .cloned()
            .collect()
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Drops every event.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &UpdaterEvent) {
        self.events.write().push(event.clone());
    }
}
