//! Event types published on the per-session EventBus.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::SessionKey;

/// Per-process event channel (§4.8, §5 ordering guarantees). One
/// `broadcast::Sender` serves every connected subscriber; a slow consumer
/// simply misses older events rather than blocking the publisher.
const EVENT_BUS_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (sender, _receiver) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Best-effort publish: if there are no subscribers, the event is
    /// simply dropped rather than treated as an error.
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

/// Severity/category of an [`Event`]. `Tool` events are passthrough from
/// the LLM client's own tool-invocation stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Info,
    Warn,
    Error,
    Tool,
}

/// An event tagged with the session it belongs to. The wire envelope is
/// `{session_key, kind, message, timestamp, metadata}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub session_key: SessionKey,
    pub kind: EventKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

impl Event {
    pub fn new(session_key: SessionKey, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            session_key,
            kind,
            message: message.into(),
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn info(session_key: SessionKey, message: impl Into<String>) -> Self {
        Self::new(session_key, EventKind::Info, message)
    }

    pub fn warn(session_key: SessionKey, message: impl Into<String>) -> Self {
        Self::new(session_key, EventKind::Warn, message)
    }

    pub fn error(session_key: SessionKey, message: impl Into<String>) -> Self {
        Self::new(session_key, EventKind::Error, message)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// A tool-progress passthrough event tagged with the reasoning-stream
    /// sub-protocol (`stream=reasoning`, `state ∈ {reset, update}`).
    pub fn reasoning_stream(session_key: SessionKey, state: ReasoningStreamState, text: impl Into<String>) -> Self {
        Self::new(session_key, EventKind::Tool, text)
            .with_metadata("stream", "reasoning")
            .with_metadata("state", state.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningStreamState {
    Reset,
    Update,
}

impl ReasoningStreamState {
    fn as_str(self) -> &'static str {
        match self {
            ReasoningStreamState::Reset => "reset",
            ReasoningStreamState::Update => "update",
        }
    }
}
