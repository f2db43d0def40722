//! Verify command: re-derive session fingerprints from their events.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use stint_core::{Session, verify_fingerprint};

/// Outcome of checking a sessions stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VerifyReport {
    pub ok: usize,
    pub mismatched: usize,
}

/// Checks every session in a JSONL stream, writing one line per session.
pub fn check<R: BufRead, W: Write>(reader: R, writer: &mut W) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read sessions")?;
        if line.trim().is_empty() {
            continue;
        }
        let session: Session = serde_json::from_str(&line)
            .with_context(|| format!("line {}: invalid session", index + 1))?;

        if verify_fingerprint(&session) {
            report.ok += 1;
            writeln!(writer, "ok {}", session.id)?;
        } else {
            report.mismatched += 1;
            tracing::warn!(session_id = %session.id, "fingerprint mismatch");
            writeln!(writer, "mismatch {}", session.id)?;
        }
    }
    Ok(report)
}

/// Verifies sessions from `file`, or stdin. Fails if any session mismatches.
pub fn run<W: Write>(writer: &mut W, file: Option<&Path>) -> Result<()> {
    let report = match file {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            check(BufReader::new(file), writer)?
        }
        None => check(io::stdin().lock(), writer)?,
    };

    if report.mismatched > 0 {
        bail!(
            "{} of {} sessions failed verification",
            report.mismatched,
            report.ok + report.mismatched
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use stint_core::{EventType, IncomingEvent, Pipeline, PipelineConfig};

    fn sessions_jsonl() -> (Vec<Session>, String) {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        for (ts, content) in [(0, "a"), (1_000, "b"), (400_000, "c")] {
            pipeline
                .enqueue(IncomingEvent::new(EventType::FileEdit, content).with_file("a.py").at(ts))
                .unwrap();
        }
        let sessions = pipeline.stop();
        let jsonl = sessions
            .iter()
            .map(|s| serde_json::to_string(s).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        (sessions, jsonl)
    }

    #[test]
    fn intact_sessions_pass() {
        let (sessions, jsonl) = sessions_jsonl();
        let mut output = Vec::new();
        let report = check(jsonl.as_bytes(), &mut output).unwrap();

        assert_eq!(report, VerifyReport { ok: 2, mismatched: 0 });
        let expected = format!("ok {}\nok {}\n", sessions[0].id, sessions[1].id);
        assert_eq!(String::from_utf8(output).unwrap(), expected);
    }

    #[test]
    fn edited_content_is_reported() {
        let (mut sessions, _) = sessions_jsonl();
        sessions[0].events[0].content = "edited".to_string();
        let jsonl = serde_json::to_string(&sessions[0]).unwrap();

        let mut output = Vec::new();
        let report = check(jsonl.as_bytes(), &mut output).unwrap();
        assert_eq!(report.mismatched, 1);
        assert!(String::from_utf8(output).unwrap().starts_with("mismatch "));
    }

    #[test]
    fn malformed_line_names_its_position() {
        let (_, jsonl) = sessions_jsonl();
        let input = format!("{jsonl}\n{{\"id\":1}}\n");

        let err = check(input.as_bytes(), &mut Vec::new()).unwrap_err();
        assert!(err.to_string().starts_with("line 3:"), "{err}");
    }
}
