//! Core domain logic for stint.
//!
//! This crate turns raw developer-activity events into sessions:
//! - Queue: bounded buffer ordering events by `(timestamp, arrival_index)`
//! - Dedup: collapsing retried deliveries within fixed time buckets
//! - Boundaries: splitting on inactivity, context switches and end markers
//! - Sessions: content-addressed IDs and fingerprints that survive replay
//! - Pipeline: the service that wires the stages together

pub mod boundary;
pub mod config;
pub mod dedup;
pub mod event;
pub mod event_type;
pub mod pipeline;
pub mod queue;
pub mod session;
pub mod types;

pub use boundary::{BoundaryDetector, SessionClose, SessionRun};
pub use config::{ConfigError, PipelineConfig};
pub use dedup::{DedupOutcome, Deduplicator};
pub use event::{Event, EventContext, IncomingEvent};
pub use event_type::{EventType, UnknownEventType};
pub use pipeline::{Pipeline, PipelineError, PipelineStats, SessionSink};
pub use queue::{EventQueue, QueueStats};
pub use session::{Session, SessionError, build_session, verify_fingerprint};
pub use types::{EventId, SessionId, ValidationError};
