//! Deterministic session construction.
//!
//! A session's identity is content-addressed: the fingerprint is a BLAKE3
//! digest over the ordered per-event content hashes, and the ID combines the
//! time span with a fingerprint prefix. Re-deriving a session from the same
//! deduplicated events (for example when replaying after a crash) yields the
//! same ID and fingerprint; arrival indexes and event IDs play no part.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::boundary::{SessionClose, SessionRun};
use crate::event::Event;
use crate::types::{SessionId, ValidationError};

/// Hex characters of the fingerprint included in the session ID.
const ID_FINGERPRINT_CHARS: usize = 16;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot build a session from zero events")]
    Empty,
    #[error("session span {start_time}..{end_time} overflows")]
    InvalidSpan { start_time: i64, end_time: i64 },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A bounded, ordered run of events forming one unit of developer work.
///
/// Invariants: `events` is non-empty and sorted by `(timestamp, arrival_index)`;
/// `start_time`/`end_time` are the first and last event timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Lowercase hex BLAKE3 digest over the ordered event content hashes.
    pub fingerprint: String,
    pub start_time: i64,
    pub end_time: i64,
    pub duration: i64,
    /// Why the session ended. `batch_edge` sessions are provisional.
    #[serde(default)]
    pub close: SessionClose,
    pub events: Vec<Event>,
}

impl Session {
    /// Records why the session ended.
    #[must_use]
    pub fn with_close(mut self, close: SessionClose) -> Self {
        self.close = close;
        self
    }

    /// Whether the session ended only because its batch did.
    pub const fn is_provisional(&self) -> bool {
        matches!(self.close, SessionClose::BatchEdge)
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

/// Fingerprint over the ordered content hashes of `events`.
fn fingerprint_of(events: &[Event]) -> String {
    let joined = events
        .iter()
        .map(|e| e.content_hash().to_hex().to_string())
        .collect::<Vec<_>>()
        .join("|");
    blake3::hash(joined.as_bytes()).to_hex().to_string()
}

fn session_id(start_time: i64, end_time: i64, fingerprint: &str) -> Result<SessionId, SessionError> {
    let prefix = &fingerprint[..ID_FINGERPRINT_CHARS.min(fingerprint.len())];
    Ok(SessionId::new(format!("ses-{start_time}-{end_time}-{prefix}"))?)
}

/// Builds a session from one detected run of events.
///
/// Events are re-sorted by `(timestamp, arrival_index)` first, so callers may
/// pass them in any order. The returned session is closed as
/// [`SessionClose::BatchEdge`] until told otherwise via [`Session::with_close`].
pub fn build_session(mut events: Vec<Event>) -> Result<Session, SessionError> {
    events.sort_by_key(Event::order_key);

    let (Some(first), Some(last)) = (events.first(), events.last()) else {
        return Err(SessionError::Empty);
    };
    let (start_time, end_time) = (first.timestamp, last.timestamp);
    let duration = end_time
        .checked_sub(start_time)
        .ok_or(SessionError::InvalidSpan {
            start_time,
            end_time,
        })?;

    let fingerprint = fingerprint_of(&events);
    let id = session_id(start_time, end_time, &fingerprint)?;

    Ok(Session {
        id,
        fingerprint,
        start_time,
        end_time,
        duration,
        close: SessionClose::BatchEdge,
        events,
    })
}

/// Builds a session from a run, carrying over why the run ended.
pub fn build_from_run(run: SessionRun) -> Result<Session, SessionError> {
    let close = run.close;
    build_session(run.events).map(|session| session.with_close(close))
}

/// Re-derives the ID and fingerprint from the session's own events and checks
/// they match the recorded ones.
pub fn verify_fingerprint(session: &Session) -> bool {
    let mut events = session.events.clone();
    events.sort_by_key(Event::order_key);
    let (Some(first), Some(last)) = (events.first(), events.last()) else {
        return false;
    };

    let fingerprint = fingerprint_of(&events);
    session_id(first.timestamp, last.timestamp, &fingerprint)
        .is_ok_and(|id| fingerprint == session.fingerprint && id == session.id)
}
