//! Raw activity events from collectors.

use serde::{Deserialize, Serialize};

use crate::event_type::EventType;
use crate::types::EventId;

fn default_source() -> String {
    "unknown".to_string()
}

/// An event as submitted by a collector, before the queue has ordered it.
///
/// Only `type` is required on the wire. Field names are snake_case; the
/// camelCase spellings some collectors emit are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingEvent {
    /// Collector-assigned ID. Generated at enqueue time when missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,
    /// Epoch milliseconds. Defaults to the wall clock when missing or negative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "filePath", skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, alias = "processId", skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    #[serde(
        default,
        alias = "workingDirectory",
        skip_serializing_if = "Option::is_none"
    )]
    pub working_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(default, alias = "sessionHint", skip_serializing_if = "Option::is_none")]
    pub session_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl IncomingEvent {
    /// Creates an event with the given type and content and no optional fields.
    pub fn new(event_type: EventType, content: impl Into<String>) -> Self {
        Self {
            id: None,
            timestamp: None,
            event_type,
            source: default_source(),
            content: content.into(),
            file_path: None,
            process_id: None,
            working_directory: None,
            application: None,
            session_hint: None,
            priority: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub const fn at(mut self, timestamp_ms: i64) -> Self {
        self.timestamp = Some(timestamp_ms);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    #[must_use]
    pub const fn with_process(mut self, pid: u32) -> Self {
        self.process_id = Some(pid);
        self
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.working_directory = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn with_application(mut self, app: impl Into<String>) -> Self {
        self.application = Some(app.into());
        self
    }
}

/// An event owned by the pipeline.
///
/// Created by the queue at enqueue time and never mutated afterwards.
/// Ordering is by `(timestamp, arrival_index)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// Monotonic per-pipeline counter assigned at enqueue.
    pub arrival_index: u64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub source: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl Event {
    /// Finalizes an incoming event with its resolved ID, timestamp and arrival index.
    pub(crate) fn from_incoming(
        incoming: IncomingEvent,
        id: EventId,
        timestamp: i64,
        arrival_index: u64,
    ) -> Self {
        Self {
            id,
            timestamp,
            arrival_index,
            event_type: incoming.event_type,
            source: incoming.source,
            content: incoming.content,
            file_path: incoming.file_path,
            process_id: incoming.process_id,
            working_directory: incoming.working_directory,
            application: incoming.application,
            session_hint: incoming.session_hint,
            priority: incoming.priority,
        }
    }

    /// The total-order key used throughout the pipeline.
    #[must_use]
    pub const fn order_key(&self) -> (i64, u64) {
        (self.timestamp, self.arrival_index)
    }

    /// BLAKE3 hash over `{type, content, file_path}`.
    ///
    /// Timestamps, IDs and arrival indexes are excluded so retried deliveries
    /// of the same activity hash identically.
    #[must_use]
    pub fn content_hash(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        // Length-prefixed fields keep ("ab", "c") distinct from ("a", "bc").
        for field in [
            self.event_type.as_str(),
            self.content.as_str(),
            self.file_path.as_deref().unwrap_or(""),
        ] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update(&[u8::from(self.file_path.is_some())]);
        hasher.finalize()
    }

    /// The working context used for context-switch detection.
    #[must_use]
    pub fn context(&self) -> EventContext<'_> {
        EventContext {
            file_path: self.file_path.as_deref(),
            process_id: self.process_id,
            working_directory: self.working_directory.as_deref(),
            application: self.application.as_deref(),
        }
    }
}

/// Where the developer was working when an event was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventContext<'a> {
    pub file_path: Option<&'a str>,
    pub process_id: Option<u32>,
    pub working_directory: Option<&'a str>,
    pub application: Option<&'a str>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Builds an already-enqueued event for stage-level tests.
    pub fn event(
        timestamp: i64,
        arrival_index: u64,
        event_type: EventType,
        content: &str,
        file: Option<&str>,
    ) -> Event {
        let mut incoming = IncomingEvent::new(event_type, content);
        incoming.file_path = file.map(String::from);
        Event::from_incoming(
            incoming,
            EventId::new(format!("evt-{arrival_index}")).unwrap(),
            timestamp,
            arrival_index,
        )
    }
}
