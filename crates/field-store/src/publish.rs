//! The publish collaborator interface
//!
//! Browser clients are notified through an external pub/sub fan-out. The
//! gateway only needs a non-blocking `publish(topic, event, payload)` call.

use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;

/// Topic and event names used by the gateway services
pub mod topics {
    /// Radio connection state
    pub const RADIOS: &str = "radios";
    /// Station band/mode and network status
    pub const STATIONS: &str = "stations";
    /// Operator messages
    pub const MESSAGES: &str = "messages";
    /// Log entries
    pub const LOGS: &str = "logs";

    pub const RADIO_STATE: &str = "radio:state";
    pub const RADIO_STOPPED: &str = "radio:stopped";
    pub const BAND_CHANGE: &str = "band:change";
    pub const NETWORK_STATUS: &str = "network:status";
    pub const MESSAGE_NEW: &str = "message:new";
    pub const LOG_ENTRY_CREATED: &str = "logEntry:created";
}

/// Fire-and-forget event publisher
pub trait Publisher: Send + Sync + 'static {
    /// Publish an event; delivery failures are the publisher's concern
    fn publish(&self, topic: &str, event: &str, payload: Value);
}

/// A published event, as captured by [`RecordingPublisher`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub topic: String,
    pub event: String,
    pub payload: Value,
}

/// Publisher that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<PublishedEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events published so far
    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events with the given event name
    pub fn events_named(&self, event: &str) -> Vec<PublishedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event == event)
            .collect()
    }

    /// Remove and return all recorded events
    pub fn drain(&self) -> Vec<PublishedEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, topic: &str, event: &str, payload: Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push(PublishedEvent {
                topic: topic.to_string(),
                event: event.to_string(),
                payload,
            });
        }
    }
}

/// Publisher that only writes events to the log
///
/// Used by the standalone gateway when no fan-out is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPublisher;

impl Publisher for TracingPublisher {
    fn publish(&self, topic: &str, event: &str, payload: Value) {
        debug!(topic, event, %payload, "publish");
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn recording_publisher_filters_and_drains() {
        let publisher = RecordingPublisher::new();
        publisher.publish(topics::RADIOS, topics::RADIO_STATE, json!({"id": "a"}));
        publisher.publish(topics::STATIONS, topics::BAND_CHANGE, json!({"band": "20"}));

        assert_eq!(publisher.events().len(), 2);
        let changes = publisher.events_named(topics::BAND_CHANGE);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].payload["band"], "20");

        assert_eq!(publisher.drain().len(), 2);
        assert!(publisher.events().is_empty());
    }
}
