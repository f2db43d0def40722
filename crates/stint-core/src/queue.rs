//! Bounded, timestamp-ordered event buffer.
//!
//! Collectors deliver events out of order and at arbitrary rates. The queue
//! assigns each event a monotonic arrival index and keeps the buffer sorted by
//! `(timestamp, arrival_index)`, so batches leave in a deterministic order.
//!
//! # Overflow
//!
//! Capacity is fixed. When an insert pushes the buffer past capacity the
//! lowest-ordered event is dropped and counted. Producers are never blocked.
//!
//! # Thread Safety
//!
//! [`EventQueue`] is a plain single-owner structure. [`crate::Pipeline`]
//! wraps it in a `Mutex` so index assignment and insertion are one critical
//! section.

use std::collections::VecDeque;

use serde::Serialize;

use crate::event::{Event, IncomingEvent};
use crate::types::EventId;

/// Source of "now" in epoch milliseconds, used for events without a timestamp.
pub type Clock = fn() -> i64;

fn system_clock() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Observable queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub len: usize,
    pub max_queue_size: usize,
    /// Events dropped by the overflow policy since creation.
    pub dropped_count: u64,
    /// Events accepted by `enqueue` since creation, including later drops.
    pub enqueued_count: u64,
}

/// Timestamp-ordered event buffer with drop-oldest overflow.
#[derive(Debug)]
pub struct EventQueue {
    buffer: VecDeque<Event>,
    max_queue_size: usize,
    next_index: u64,
    dropped_count: u64,
    clock: Clock,
}

impl EventQueue {
    /// Creates an empty queue holding at most `max_queue_size` events.
    pub fn new(max_queue_size: usize) -> Self {
        Self::with_clock(max_queue_size, system_clock)
    }

    /// Creates a queue that stamps undated events using `clock`.
    pub fn with_clock(max_queue_size: usize, clock: Clock) -> Self {
        Self {
            buffer: VecDeque::with_capacity(max_queue_size.min(4096) + 1),
            max_queue_size,
            next_index: 0,
            dropped_count: 0,
            clock,
        }
    }

    /// Inserts an event at its ordered position and returns its ID.
    ///
    /// Events without a usable timestamp are stamped with the clock. If the
    /// buffer then exceeds capacity, the oldest event is discarded.
    pub fn enqueue(&mut self, incoming: IncomingEvent) -> EventId {
        let arrival_index = self.next_index;
        self.next_index += 1;

        let timestamp = match incoming.timestamp {
            Some(ts) if ts >= 0 => ts,
            other => {
                let now = (self.clock)();
                tracing::warn!(
                    arrival_index,
                    timestamp = ?other,
                    defaulted_to = now,
                    "event has missing or invalid timestamp, using current time"
                );
                now
            }
        };
        let id = incoming.id.clone().unwrap_or_else(EventId::generate);
        let event = Event::from_incoming(incoming, id.clone(), timestamp, arrival_index);

        let key = event.order_key();
        let position = self.buffer.partition_point(|e| e.order_key() < key);
        self.buffer.insert(position, event);

        if self.buffer.len() > self.max_queue_size {
            if let Some(dropped) = self.buffer.pop_front() {
                self.dropped_count += 1;
                tracing::debug!(
                    event_id = %dropped.id,
                    timestamp = dropped.timestamp,
                    dropped_count = self.dropped_count,
                    "queue full, dropped oldest event"
                );
            }
        }

        id
    }

    /// Removes and returns up to `batch_size` events from the front, in order.
    pub fn dequeue_batch(&mut self, batch_size: usize) -> Vec<Event> {
        let take = batch_size.min(self.buffer.len());
        self.buffer.drain(..take).collect()
    }

    /// Removes and returns every buffered event, in order.
    pub fn drain(&mut self) -> Vec<Event> {
        self.buffer.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            len: self.buffer.len(),
            max_queue_size: self.max_queue_size,
            dropped_count: self.dropped_count,
            enqueued_count: self.next_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_type::EventType;

    fn edit(ts: i64) -> IncomingEvent {
        IncomingEvent::new(EventType::FileEdit, format!("edit@{ts}"))
            .with_file("a.py")
            .at(ts)
    }

    fn keys(events: &[Event]) -> Vec<(i64, u64)> {
        events.iter().map(Event::order_key).collect()
    }

    #[test]
    fn dequeues_in_timestamp_order() {
        let mut queue = EventQueue::new(100);
        for ts in [300, 100, 200, 50, 250] {
            queue.enqueue(edit(ts));
        }

        let batch = queue.dequeue_batch(10);
        let timestamps: Vec<_> = batch.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![50, 100, 200, 250, 300]);
        assert!(queue.is_empty());
    }

    #[test]
    fn equal_timestamps_keep_arrival_order() {
        let mut queue = EventQueue::new(100);
        let first = queue.enqueue(edit(1_000));
        queue.enqueue(edit(2_000));
        let second = queue.enqueue(edit(1_000));

        let batch = queue.dequeue_batch(3);
        assert_eq!(batch[0].id, first);
        assert_eq!(batch[1].id, second);
        assert_eq!(keys(&batch), vec![(1_000, 0), (1_000, 2), (2_000, 1)]);
    }

    #[test]
    fn successive_batches_are_globally_ordered() {
        let mut queue = EventQueue::new(100);
        // Deterministic shuffle with duplicates.
        for i in 0..40_i64 {
            queue.enqueue(edit((i * 37) % 11 * 100));
        }

        let mut all = Vec::new();
        while !queue.is_empty() {
            all.extend(queue.dequeue_batch(7));
        }

        assert_eq!(all.len(), 40);
        assert!(all.windows(2).all(|w| w[0].order_key() < w[1].order_key()));
    }

    #[test]
    fn arrival_indexes_are_unique_and_increasing() {
        let mut queue = EventQueue::new(100);
        for ts in [5, 4, 3, 2, 1] {
            queue.enqueue(edit(ts));
        }
        let mut indexes: Vec<_> = queue.drain().iter().map(|e| e.arrival_index).collect();
        indexes.sort_unstable();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn overflow_drops_oldest_and_counts() {
        let max = 5;
        let k = 3;
        let mut queue = EventQueue::new(max);
        for ts in 0..(max + k) {
            queue.enqueue(edit(i64::try_from(ts).unwrap() * 1_000));
        }

        let stats = queue.stats();
        assert_eq!(queue.len(), max);
        assert_eq!(stats.dropped_count, 3);
        assert_eq!(stats.enqueued_count, 8);

        let remaining: Vec<_> = queue.drain().iter().map(|e| e.timestamp).collect();
        assert_eq!(remaining, vec![3_000, 4_000, 5_000, 6_000, 7_000]);
    }

    #[test]
    fn overflow_can_drop_the_incoming_event_itself() {
        let mut queue = EventQueue::new(2);
        queue.enqueue(edit(2_000));
        queue.enqueue(edit(3_000));
        queue.enqueue(edit(1_000));

        let remaining: Vec<_> = queue.drain().iter().map(|e| e.timestamp).collect();
        assert_eq!(remaining, vec![2_000, 3_000]);
        assert_eq!(queue.stats().dropped_count, 1);
    }

    #[test]
    fn missing_timestamp_uses_clock() {
        let mut queue = EventQueue::with_clock(10, || 42_000);
        queue.enqueue(IncomingEvent::new(EventType::Prompt, "hello"));
        queue.enqueue(IncomingEvent::new(EventType::Prompt, "negative").at(-5));

        let batch = queue.dequeue_batch(10);
        assert!(batch.iter().all(|e| e.timestamp == 42_000));
    }

    #[test]
    fn keeps_supplied_id_and_generates_missing_ones() {
        let mut queue = EventQueue::new(10);
        let supplied = EventId::new("collector-7").unwrap();
        let returned = queue.enqueue(edit(1).with_id(supplied.clone()));
        assert_eq!(returned, supplied);

        let generated = queue.enqueue(edit(2));
        assert!(!generated.as_str().is_empty());
        assert_ne!(generated, supplied);
    }

    #[test]
    fn dequeue_batch_respects_size() {
        let mut queue = EventQueue::new(10);
        for ts in 0..4 {
            queue.enqueue(edit(ts));
        }
        assert_eq!(queue.dequeue_batch(3).len(), 3);
        assert_eq!(queue.dequeue_batch(3).len(), 1);
        assert!(queue.dequeue_batch(3).is_empty());
    }
}
