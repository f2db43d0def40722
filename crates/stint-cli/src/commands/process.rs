//! Process command: replay JSONL events through the pipeline.
//!
//! Each input line is one event as a collector would submit it. Sessions are
//! written to stdout as JSONL, or as a short table with `--summary`.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rayon::prelude::*;
use serde_json::{Map, Value};
use stint_core::{IncomingEvent, Pipeline, PipelineStats, Session};

use crate::Config;

/// Rewrites an RFC 3339 `timestamp` into epoch milliseconds.
///
/// Values that are neither integers nor parseable strings are removed, so the
/// pipeline falls back to the current time for that event.
fn normalize_timestamp(obj: &mut Map<String, Value>) {
    let normalized = match obj.get("timestamp") {
        None | Some(Value::Null) => return,
        Some(Value::Number(n)) if n.is_i64() => return,
        Some(Value::String(raw)) => match DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => Some(dt.timestamp_millis()),
            Err(e) => {
                tracing::warn!(timestamp = %raw, error = %e, "ignoring unparseable timestamp");
                None
            }
        },
        Some(other) => {
            tracing::warn!(timestamp = %other, "ignoring non-integer timestamp");
            None
        }
    };

    match normalized {
        Some(ms) => {
            obj.insert("timestamp".to_string(), Value::from(ms));
        }
        None => {
            obj.remove("timestamp");
        }
    }
}

/// Parses one JSONL line into an event.
pub fn parse_event_line(line: &str) -> Result<IncomingEvent> {
    let mut value: Value = serde_json::from_str(line).context("invalid JSON")?;
    if let Some(obj) = value.as_object_mut() {
        normalize_timestamp(obj);
    }
    serde_json::from_value(value).context("invalid event")
}

/// Reads events from a JSONL stream, skipping lines that do not parse.
fn read_events<R: BufRead>(reader: R, origin: &str) -> Result<Vec<IncomingEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {origin}"))?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_event_line(&line) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!(origin, line = index + 1, error = %format!("{e:#}"), "skipping invalid event");
            }
        }
    }
    Ok(events)
}

fn read_file(path: &Path) -> Result<Vec<IncomingEvent>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_events(BufReader::new(file), &path.display().to_string())
}

/// Reads all inputs, parsing files in parallel. Events keep file order.
fn read_inputs(files: &[PathBuf]) -> Result<Vec<IncomingEvent>> {
    if files.is_empty() {
        return read_events(io::stdin().lock(), "stdin");
    }

    let per_file: Vec<Vec<IncomingEvent>> = files
        .par_iter()
        .map(|path| read_file(path))
        .collect::<Result<_>>()?;
    Ok(per_file.into_iter().flatten().collect())
}

/// Formats a duration in milliseconds for display.
pub fn format_duration(ms: i64) -> String {
    let seconds = ms / 1_000;
    if ms < 1_000 {
        format!("{ms}ms")
    } else if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 3_600 {
        format!("{}m {:02}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {:02}m", seconds / 3_600, (seconds % 3_600) / 60)
    }
}

fn format_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms).map_or_else(
        || format!("{ms}ms"),
        |dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

fn write_summary<W: Write>(writer: &mut W, sessions: &[Session], stats: &PipelineStats) -> Result<()> {
    writeln!(writer, "Sessions: {}", sessions.len())?;
    for session in sessions {
        writeln!(
            writer,
            "  {}  {}  {}  {} events  {}",
            session.id,
            format_timestamp(session.start_time),
            format_duration(session.duration),
            session.event_count(),
            session.close,
        )?;
    }
    writeln!(writer)?;
    writeln!(
        writer,
        "Events: {} enqueued, {} dropped, {} duplicates",
        stats.enqueued_count, stats.dropped_count, stats.duplicates_dropped
    )?;
    writeln!(
        writer,
        "Batches: {} processed, {} failed runs",
        stats.batches_processed, stats.failed_runs
    )?;
    Ok(())
}

/// Replays events into sessions and writes them to `writer`.
pub fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    files: &[PathBuf],
    summary: bool,
) -> Result<PipelineStats> {
    let events = read_inputs(files)?;
    tracing::debug!(events = events.len(), "read events");

    let pipeline =
        Pipeline::new(config.pipeline.clone()).context("invalid pipeline configuration")?;

    let mut sessions: Vec<Session> = Vec::new();
    for event in events {
        pipeline.process_event_into(event, &mut sessions);
    }
    sessions.extend(pipeline.stop());
    let stats = pipeline.stats();

    if summary {
        write_summary(writer, &sessions, &stats)?;
    } else {
        for session in &sessions {
            let json = serde_json::to_string(session).context("failed to serialize session")?;
            writeln!(writer, "{json}")?;
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;
    use stint_core::EventType;

    #[test]
    fn parses_millisecond_timestamps() {
        let event = parse_event_line(r#"{"type":"edit","timestamp":1500,"filePath":"a.py"}"#).unwrap();
        assert_eq!(event.timestamp, Some(1_500));
        assert_eq!(event.event_type, EventType::FileEdit);
        assert_eq!(event.file_path.as_deref(), Some("a.py"));
    }

    #[test]
    fn parses_rfc3339_timestamps() {
        let event =
            parse_event_line(r#"{"type":"prompt","timestamp":"1970-01-01T00:00:02.500Z"}"#).unwrap();
        assert_eq!(event.timestamp, Some(2_500));
    }

    #[test]
    fn drops_unparseable_timestamps() {
        let event = parse_event_line(r#"{"type":"prompt","timestamp":"yesterday"}"#).unwrap();
        assert_eq!(event.timestamp, None);

        let event = parse_event_line(r#"{"type":"prompt","timestamp":12.5}"#).unwrap();
        assert_eq!(event.timestamp, None);
    }

    #[test]
    fn rejects_unknown_types_and_bad_json() {
        assert!(parse_event_line(r#"{"type":"heartbeat"}"#).is_err());
        assert!(parse_event_line("not json").is_err());
    }

    #[test]
    fn read_events_skips_invalid_lines() {
        let input = "{\"type\":\"edit\",\"timestamp\":0}\n\nnot json\n{\"type\":\"command\",\"timestamp\":5}\n";
        let events = read_events(input.as_bytes(), "test").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, EventType::Command);
    }

    #[test]
    fn format_duration_scales_units() {
        assert_eq!(format_duration(0), "0ms");
        assert_eq!(format_duration(999), "999ms");
        assert_eq!(format_duration(1_000), "1s");
        assert_eq!(format_duration(61_000), "1m 01s");
        assert_eq!(format_duration(3_723_000), "1h 02m");
    }

    #[test]
    fn summary_for_timeout_scenario() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"type":"edit","timestamp":0,"content":"a","filePath":"a.py"}}"#).unwrap();
        writeln!(file, r#"{{"type":"edit","timestamp":1000,"content":"b","filePath":"a.py"}}"#).unwrap();
        writeln!(file, r#"{{"type":"edit","timestamp":400000,"content":"c","filePath":"a.py"}}"#).unwrap();
        file.flush().unwrap();

        let mut json = Vec::new();
        run(&mut json, &Config::default(), &[file.path().to_path_buf()], false).unwrap();
        let sessions: Vec<Session> = String::from_utf8(json)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(sessions.len(), 2);

        let mut output = Vec::new();
        let stats = run(&mut output, &Config::default(), &[file.path().to_path_buf()], true).unwrap();
        assert_eq!(stats.enqueued_count, 3);

        let mut output = String::from_utf8(output).unwrap();
        for session in &sessions {
            output = output.replace(session.id.as_str(), "[ID]");
        }
        insta::assert_snapshot!(output, @r"
        Sessions: 2
          [ID]  1970-01-01T00:00:00Z  1s  2 events  timeout
          [ID]  1970-01-01T00:06:40Z  0ms  1 events  batch_edge

        Events: 3 enqueued, 0 dropped, 0 duplicates
        Batches: 1 processed, 0 failed runs
        ");
    }
}
