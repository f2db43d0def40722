//! Pipeline orchestration: enqueue → dequeue → dedup → boundaries → sessions.
//!
//! # Thread Safety
//!
//! [`Pipeline`] is `Send + Sync`; share it as `Arc<Pipeline>` between request
//! handlers. The ordered buffer sits behind a `Mutex`, and arrival-index
//! assignment happens inside that critical section, so arrival order is the
//! true insertion order. Batch processing is serialized by a second lock and
//! runs on a dequeued local copy, so producers only wait for the dequeue itself.
//!
//! # Failure Model
//!
//! Nothing in here returns an error to callers of [`Pipeline::process_event`]
//! or [`Pipeline::process_batch`]. A run that fails to build is logged,
//! counted in [`PipelineStats::failed_runs`] and left out of that batch's
//! output; sessions already built from the same batch are still returned.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, mpsc};

use serde::Serialize;
use thiserror::Error;

use crate::boundary::{BoundaryDetector, SessionRun};
use crate::config::{ConfigError, PipelineConfig};
use crate::dedup::{DedupOutcome, Deduplicator};
use crate::event::{Event, IncomingEvent};
use crate::queue::{Clock, EventQueue};
use crate::session::{Session, build_from_run};
use crate::types::EventId;

/// Pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The configuration failed validation.
    #[error("invalid pipeline configuration: {0}")]
    Config(#[from] ConfigError),
    /// The pipeline was stopped and no longer accepts events.
    #[error("pipeline is stopped")]
    Stopped,
}

/// Receives sessions as the pipeline produces them.
pub trait SessionSink {
    fn accept(&mut self, session: Session);
}

impl SessionSink for Vec<Session> {
    fn accept(&mut self, session: Session) {
        self.push(session);
    }
}

impl SessionSink for mpsc::Sender<Session> {
    fn accept(&mut self, session: Session) {
        if let Err(mpsc::SendError(session)) = self.send(session) {
            tracing::warn!(session_id = %session.id, "session receiver dropped, discarding session");
        }
    }
}

/// Snapshot of pipeline state for health/status surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub queue_length: usize,
    pub batch_size: usize,
    pub max_queue_size: usize,
    /// Whether a batch is being processed right now.
    pub processing: bool,
    pub running: bool,
    /// Events discarded by the queue's overflow policy.
    pub dropped_count: u64,
    pub enqueued_count: u64,
    pub duplicates_dropped: u64,
    pub sessions_emitted: u64,
    /// Runs that failed to build and were left out of their batch's output.
    pub failed_runs: u64,
    pub batches_processed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    duplicates_dropped: AtomicU64,
    sessions_emitted: AtomicU64,
    failed_runs: AtomicU64,
    batches_processed: AtomicU64,
}

/// Clears the processing flag even if a stage panics.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The event ordering and session assembly service.
///
/// Constructed running; [`Pipeline::stop`] flushes what is left and rejects
/// further events.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    queue: Mutex<EventQueue>,
    batch_lock: Mutex<()>,
    deduplicator: Deduplicator,
    detector: BoundaryDetector,
    running: AtomicBool,
    processing: AtomicBool,
    counters: Counters,
}

impl Pipeline {
    /// Validates `config` and starts a pipeline.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::build(config, EventQueue::new)
    }

    /// Like [`Pipeline::new`], stamping undated events with `clock`.
    pub fn with_clock(config: PipelineConfig, clock: Clock) -> Result<Self, PipelineError> {
        Self::build(config, |max| EventQueue::with_clock(max, clock))
    }

    fn build(
        config: PipelineConfig,
        make_queue: impl FnOnce(usize) -> EventQueue,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let detector = BoundaryDetector::from_config(&config)?;

        tracing::debug!(?config, "starting pipeline");
        Ok(Self {
            queue: Mutex::new(make_queue(config.max_queue_size)),
            batch_lock: Mutex::new(()),
            deduplicator: Deduplicator::new(config.dedup_window_ms)?,
            detector,
            running: AtomicBool::new(true),
            processing: AtomicBool::new(false),
            counters: Counters::default(),
            config,
        })
    }

    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn lock_queue(&self) -> MutexGuard<'_, EventQueue> {
        // Every queue operation leaves the buffer sorted, so a panic elsewhere
        // cannot have left it half-updated.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn queue_len(&self) -> usize {
        self.lock_queue().len()
    }

    /// Adds an event to the ordered buffer without triggering processing.
    pub fn enqueue(&self, event: IncomingEvent) -> Result<EventId, PipelineError> {
        let mut queue = self.lock_queue();
        if !self.is_running() {
            return Err(PipelineError::Stopped);
        }
        Ok(queue.enqueue(event))
    }

    /// Enqueues an event and processes one batch if the queue has filled up.
    ///
    /// Returns the sessions built by that batch, usually none.
    pub fn process_event(&self, event: IncomingEvent) -> Vec<Session> {
        let mut sessions = Vec::new();
        self.process_event_into(event, &mut sessions);
        sessions
    }

    /// Like [`Pipeline::process_event`], handing sessions to `sink`.
    ///
    /// Returns the number of sessions delivered.
    pub fn process_event_into(&self, event: IncomingEvent, sink: &mut impl SessionSink) -> usize {
        if let Err(e) = self.enqueue(event) {
            tracing::warn!(error = %e, "rejected event");
            return 0;
        }
        if self.queue_len() < self.config.batch_size {
            return 0;
        }
        deliver(self.process_batch(), sink)
    }

    /// Dequeues one batch and turns it into sessions.
    pub fn process_batch(&self) -> Vec<Session> {
        let _serialized = self.batch_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let batch = self.lock_queue().dequeue_batch(self.config.batch_size);
        if batch.is_empty() {
            return Vec::new();
        }

        let _processing = ProcessingGuard::enter(&self.processing);
        self.run_stages(batch)
    }

    /// Processes everything buffered at the time of the call.
    ///
    /// Intended for a periodic timer, so that trickling events do not sit in
    /// a half-full queue. Events arriving during the flush are left for later.
    pub fn flush(&self) -> Vec<Session> {
        let pending = self.queue_len();
        let rounds = pending.div_ceil(self.config.batch_size);

        let mut sessions = Vec::new();
        for _ in 0..rounds {
            sessions.extend(self.process_batch());
        }
        sessions
    }

    /// Like [`Pipeline::flush`], handing sessions to `sink`.
    pub fn flush_into(&self, sink: &mut impl SessionSink) -> usize {
        deliver(self.flush(), sink)
    }

    /// Stops accepting events and flushes the remaining buffer.
    ///
    /// Calling `stop` again is harmless and returns nothing.
    pub fn stop(&self) -> Vec<Session> {
        {
            let _queue = self.lock_queue();
            if !self.running.swap(false, Ordering::SeqCst) {
                return Vec::new();
            }
        }
        let sessions = self.flush();
        tracing::info!(
            final_sessions = sessions.len(),
            stats = ?self.stats(),
            "pipeline stopped"
        );
        sessions
    }

    pub fn stats(&self) -> PipelineStats {
        let queue = self.lock_queue().stats();
        PipelineStats {
            queue_length: queue.len,
            batch_size: self.config.batch_size,
            max_queue_size: queue.max_queue_size,
            processing: self.processing.load(Ordering::SeqCst),
            running: self.is_running(),
            dropped_count: queue.dropped_count,
            enqueued_count: queue.enqueued_count,
            duplicates_dropped: self.counters.duplicates_dropped.load(Ordering::Relaxed),
            sessions_emitted: self.counters.sessions_emitted.load(Ordering::Relaxed),
            failed_runs: self.counters.failed_runs.load(Ordering::Relaxed),
            batches_processed: self.counters.batches_processed.load(Ordering::Relaxed),
        }
    }

    fn run_stages(&self, batch: Vec<Event>) -> Vec<Session> {
        let batch_len = batch.len();

        let DedupOutcome { events, duplicates } = self.deduplicator.deduplicate(batch);
        self.counters
            .duplicates_dropped
            .fetch_add(duplicates as u64, Ordering::Relaxed);

        let runs = self.detector.detect(events);
        let run_count = runs.len();
        let sessions = self.build_runs(runs);

        self.counters.batches_processed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            batch_len,
            duplicates,
            runs = run_count,
            sessions = sessions.len(),
            "processed batch"
        );
        sessions
    }

    fn build_runs(&self, runs: Vec<SessionRun>) -> Vec<Session> {
        let mut sessions = Vec::with_capacity(runs.len());
        for run in runs {
            let (start_time, event_count) = (run.start_time, run.events.len());
            match build_from_run(run) {
                Ok(session) => {
                    tracing::info!(
                        session_id = %session.id,
                        events = session.event_count(),
                        duration_ms = session.duration,
                        close = %session.close,
                        "built session"
                    );
                    self.counters.sessions_emitted.fetch_add(1, Ordering::Relaxed);
                    sessions.push(session);
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        start_time,
                        event_count,
                        "failed to build session, dropping run"
                    );
                    self.counters.failed_runs.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        sessions
    }
}

fn deliver(sessions: Vec<Session>, sink: &mut impl SessionSink) -> usize {
    let count = sessions.len();
    for session in sessions {
        sink.accept(session);
    }
    count
}
