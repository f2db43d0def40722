//! Event type enum as the single source of truth for event type strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical telemetry event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    FileEdit,
    Prompt,
    Command,
    Message,
    /// Explicit end-of-session marker emitted by a collector.
    SessionEnd,
}

impl EventType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FileEdit => "file_edit",
            Self::Prompt => "prompt",
            Self::Command => "command",
            Self::Message => "message",
            Self::SessionEnd => "session_end",
        }
    }

    /// Whether this type closes the session it appears in.
    #[must_use]
    pub const fn is_end_marker(self) -> bool {
        matches!(self, Self::SessionEnd)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file_edit" | "edit" | "file_change" | "file_save" => Ok(Self::FileEdit),
            "prompt" | "ai_prompt" => Ok(Self::Prompt),
            "command" | "terminal_command" | "terminal" => Ok(Self::Command),
            "message" | "conversation_turn" | "conversation" => Ok(Self::Message),
            "session_end" | "end" | "session_stop" => Ok(Self::SessionEnd),
            _ => Err(UnknownEventType(s.to_string())),
        }
    }
}

impl Serialize for EventType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown event type strings.
#[derive(Debug, Clone)]
pub struct UnknownEventType(String);

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event type: {}", self.0)
    }
}

impl std::error::Error for UnknownEventType {}
