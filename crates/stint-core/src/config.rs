//! Pipeline configuration.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors, reported when a pipeline is constructed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A size or window that must be positive was zero.
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
    /// Batches larger than the queue could never fill, so the oldest events
    /// would be dropped instead of processed.
    #[error("batch_size ({batch_size}) cannot exceed max_queue_size ({max_queue_size})")]
    BatchExceedsCapacity {
        batch_size: usize,
        max_queue_size: usize,
    },
    /// A threshold was negative.
    #[error("{field} cannot be negative, got {value}")]
    Negative { field: &'static str, value: i64 },
    /// A terminator pattern failed to compile.
    #[error("invalid terminator pattern {pattern:?}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Configuration for the ordering and sessionization pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Events per processing cycle. Default: 10.
    pub batch_size: usize,

    /// Hard capacity of the ordering buffer. Oldest events are dropped
    /// beyond this. Default: 1000.
    pub max_queue_size: usize,

    /// Width of the dedup time buckets. Default: 5000 (5 seconds).
    pub dedup_window_ms: i64,

    /// Gap after which a new session always starts. Default: 300,000 (5 min).
    pub session_timeout_ms: i64,

    /// Minimum gap for a change of working context to start a new session.
    /// Default: 60,000 (1 min).
    pub context_switch_threshold_ms: i64,

    /// Regular expressions matched against event content. A match closes the
    /// current session after that event.
    pub terminator_patterns: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_queue_size: 1000,
            dedup_window_ms: 5_000,              // 5 seconds
            session_timeout_ms: 300_000,         // 5 minutes
            context_switch_threshold_ms: 60_000, // 1 minute
            terminator_patterns: vec![r"^\s*(exit|logout)\s*$".to_string()],
        }
    }
}

impl PipelineConfig {
    /// Checks sizes and thresholds, and that every terminator pattern compiles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::NotPositive {
                field: "batch_size",
            });
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::NotPositive {
                field: "max_queue_size",
            });
        }
        if self.batch_size > self.max_queue_size {
            return Err(ConfigError::BatchExceedsCapacity {
                batch_size: self.batch_size,
                max_queue_size: self.max_queue_size,
            });
        }
        if self.dedup_window_ms <= 0 {
            return Err(ConfigError::NotPositive {
                field: "dedup_window_ms",
            });
        }
        for (field, value) in [
            ("session_timeout_ms", self.session_timeout_ms),
            ("context_switch_threshold_ms", self.context_switch_threshold_ms),
        ] {
            if value < 0 {
                return Err(ConfigError::Negative { field, value });
            }
        }
        self.compile_terminators().map(|_| ())
    }

    pub(crate) fn compile_terminators(&self) -> Result<Vec<Regex>, ConfigError> {
        self.terminator_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect()
    }
}
