//! Windowed content deduplication.
//!
//! Collectors retry, and several collectors may observe the same activity.
//! Within one ordered batch, events with the same content hash that fall in the
//! same `floor(timestamp / window)` bucket are collapsed to the first one seen.
//!
//! Buckets are fixed, not sliding: with a 5s window, identical events at
//! 4999ms and 5001ms land in buckets 0 and 1 and are both kept.

use std::collections::HashSet;

use crate::config::ConfigError;
use crate::event::Event;

/// Result of deduplicating one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupOutcome {
    /// Surviving events, in their input order.
    pub events: Vec<Event>,
    /// How many events were dropped as duplicates.
    pub duplicates: usize,
}

/// Collapses content-identical events within fixed time buckets.
#[derive(Debug, Clone, Copy)]
pub struct Deduplicator {
    window_ms: i64,
}

impl Deduplicator {
    /// Creates a deduplicator with the given bucket width, which must be positive.
    pub const fn new(window_ms: i64) -> Result<Self, ConfigError> {
        if window_ms <= 0 {
            return Err(ConfigError::NotPositive {
                field: "dedup_window_ms",
            });
        }
        Ok(Self { window_ms })
    }

    /// The time bucket an event belongs to.
    pub const fn bucket(&self, timestamp: i64) -> i64 {
        timestamp.div_euclid(self.window_ms)
    }

    /// Keeps the first event for each `(content hash, bucket)` pair.
    pub fn deduplicate(&self, ordered_events: Vec<Event>) -> DedupOutcome {
        let mut seen = HashSet::with_capacity(ordered_events.len());
        let total = ordered_events.len();

        let events: Vec<Event> = ordered_events
            .into_iter()
            .filter(|event| {
                let key = (event.content_hash(), self.bucket(event.timestamp));
                let first = seen.insert(key);
                if !first {
                    tracing::trace!(event_id = %event.id, "dropping duplicate event");
                }
                first
            })
            .collect();

        let duplicates = total - events.len();
        DedupOutcome { events, duplicates }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::test_support::event;
    use crate::event_type::EventType;

    fn edit(ts: i64, index: u64) -> Event {
        event(ts, index, EventType::FileEdit, "x = 1", Some("a.py"))
    }

    fn timestamps(outcome: &DedupOutcome) -> Vec<i64> {
        outcome.events.iter().map(|e| e.timestamp).collect()
    }

    #[test]
    fn collapses_duplicates_within_window() {
        let dedup = Deduplicator::new(5_000).unwrap();
        let outcome = dedup.deduplicate(vec![edit(0, 0), edit(4_000, 1)]);

        assert_eq!(timestamps(&outcome), vec![0]);
        assert_eq!(outcome.duplicates, 1);
    }

    #[test]
    fn keeps_duplicates_beyond_window() {
        let dedup = Deduplicator::new(5_000).unwrap();
        let outcome = dedup.deduplicate(vec![edit(0, 0), edit(6_000, 1)]);

        assert_eq!(timestamps(&outcome), vec![0, 6_000]);
        assert_eq!(outcome.duplicates, 0);
    }

    #[test]
    fn bucket_edge_splits_near_duplicates() {
        let dedup = Deduplicator::new(5_000).unwrap();
        let outcome = dedup.deduplicate(vec![edit(4_999, 0), edit(5_001, 1)]);

        assert_eq!(timestamps(&outcome), vec![4_999, 5_001]);
    }

    #[test]
    fn first_occurrence_wins() {
        let dedup = Deduplicator::new(5_000).unwrap();
        let outcome = dedup.deduplicate(vec![edit(100, 3), edit(200, 9)]);

        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].arrival_index, 3);
    }

    #[test]
    fn different_content_is_never_merged() {
        let dedup = Deduplicator::new(5_000).unwrap();
        let outcome = dedup.deduplicate(vec![
            event(0, 0, EventType::FileEdit, "x = 1", Some("a.py")),
            event(1, 1, EventType::FileEdit, "x = 1", Some("b.py")),
            event(2, 2, EventType::Command, "x = 1", Some("a.py")),
            event(3, 3, EventType::FileEdit, "x = 2", Some("a.py")),
        ]);

        assert_eq!(outcome.events.len(), 4);
        assert_eq!(outcome.duplicates, 0);
    }

    #[test]
    fn preserves_input_order() {
        let dedup = Deduplicator::new(1_000).unwrap();
        let outcome = dedup.deduplicate(vec![
            event(10, 0, EventType::Prompt, "a", None),
            event(20, 1, EventType::Prompt, "b", None),
            event(30, 2, EventType::Prompt, "a", None),
            event(40, 3, EventType::Prompt, "c", None),
        ]);

        let contents: Vec<_> = outcome.events.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[test]
    fn non_positive_window_is_rejected() {
        for window in [0, -5_000] {
            assert!(matches!(
                Deduplicator::new(window),
                Err(ConfigError::NotPositive {
                    field: "dedup_window_ms"
                })
            ));
        }
    }

    #[test]
    fn empty_batch_is_empty() {
        let outcome = Deduplicator::new(5_000).unwrap().deduplicate(Vec::new());
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.duplicates, 0);
    }
}
