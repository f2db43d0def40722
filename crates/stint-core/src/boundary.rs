//! Session boundary detection.
//!
//! Splits one ordered, deduplicated event stream into runs, each of which
//! becomes a session. Every event is compared with the previous event of the
//! run being accumulated:
//!
//! 1. Timeout - the gap exceeds `session_timeout_ms`.
//! 2. Context switch - the working context (file, process, directory,
//!    application) changed and the gap exceeds `context_switch_threshold_ms`.
//!    Quick back-and-forth between files stays in one session.
//! 3. Explicit marker - a `session_end` event, or content matching a
//!    terminator pattern. The marker is the last event of its session.
//!
//! Whatever is left when the batch runs out is closed as
//! [`SessionClose::BatchEdge`]. Such runs are provisional: the next batch may
//! well continue the same piece of work.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, PipelineConfig};
use crate::event::Event;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionClose {
    /// The next event came after the inactivity timeout.
    Timeout,
    /// The next event was in a different context after the switch threshold.
    ContextSwitch,
    /// The last event was an explicit end marker.
    Marker,
    /// The batch ended without a boundary.
    #[default]
    BatchEdge,
}

impl SessionClose {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ContextSwitch => "context_switch",
            Self::Marker => "marker",
            Self::BatchEdge => "batch_edge",
        }
    }
}

impl std::fmt::Display for SessionClose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded run of events detected as one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRun {
    pub events: Vec<Event>,
    pub start_time: i64,
    pub end_time: i64,
    pub duration: i64,
    pub close: SessionClose,
}

impl SessionRun {
    fn finalize(events: Vec<Event>, close: SessionClose) -> Option<Self> {
        let start_time = events.first()?.timestamp;
        let end_time = events.last()?.timestamp;
        Some(Self {
            events,
            start_time,
            end_time,
            duration: end_time.saturating_sub(start_time),
            close,
        })
    }
}

/// Decides where one session ends and the next begins.
#[derive(Debug, Clone)]
pub struct BoundaryDetector {
    session_timeout_ms: i64,
    context_switch_threshold_ms: i64,
    terminators: Vec<Regex>,
}

impl BoundaryDetector {
    pub fn new(
        session_timeout_ms: i64,
        context_switch_threshold_ms: i64,
        terminators: Vec<Regex>,
    ) -> Self {
        Self {
            session_timeout_ms,
            context_switch_threshold_ms,
            terminators,
        }
    }

    /// Builds a detector from pipeline configuration, compiling terminator patterns.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.session_timeout_ms,
            config.context_switch_threshold_ms,
            config.compile_terminators()?,
        ))
    }

    /// Whether `event` explicitly ends its session.
    pub fn is_marker(&self, event: &Event) -> bool {
        event.event_type.is_end_marker()
            || self.terminators.iter().any(|re| re.is_match(&event.content))
    }

    /// Boundary rule that fires between `previous` and `event`, if any.
    fn boundary_between(&self, previous: &Event, event: &Event) -> Option<SessionClose> {
        let gap = event.timestamp.saturating_sub(previous.timestamp);
        if gap > self.session_timeout_ms {
            return Some(SessionClose::Timeout);
        }
        if gap > self.context_switch_threshold_ms && event.context() != previous.context() {
            return Some(SessionClose::ContextSwitch);
        }
        None
    }

    /// Splits an ordered batch into session runs.
    pub fn detect(&self, events: Vec<Event>) -> Vec<SessionRun> {
        let mut runs = Vec::new();
        let mut current: Vec<Event> = Vec::new();

        for event in events {
            let boundary = current
                .last()
                .and_then(|previous| self.boundary_between(previous, &event));
            if let Some(close) = boundary {
                tracing::trace!(%close, event_id = %event.id, "session boundary");
                runs.extend(SessionRun::finalize(std::mem::take(&mut current), close));
            }

            let marker = self.is_marker(&event);
            current.push(event);

            if marker {
                runs.extend(SessionRun::finalize(
                    std::mem::take(&mut current),
                    SessionClose::Marker,
                ));
            }
        }

        runs.extend(SessionRun::finalize(current, SessionClose::BatchEdge));
        runs
    }
}
