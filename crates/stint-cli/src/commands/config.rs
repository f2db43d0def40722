//! Config command: print the effective pipeline configuration.

use std::io::Write;

use anyhow::Result;

use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let pipeline = &config.pipeline;
    writeln!(writer, "batch_size = {}", pipeline.batch_size)?;
    writeln!(writer, "max_queue_size = {}", pipeline.max_queue_size)?;
    writeln!(writer, "dedup_window_ms = {}", pipeline.dedup_window_ms)?;
    writeln!(writer, "session_timeout_ms = {}", pipeline.session_timeout_ms)?;
    writeln!(
        writer,
        "context_switch_threshold_ms = {}",
        pipeline.context_switch_threshold_ms
    )?;
    writeln!(
        writer,
        "terminator_patterns = {}",
        serde_json::to_string(&pipeline.terminator_patterns)?
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    #[test]
    fn prints_defaults() {
        let mut output = Vec::new();
        run(&mut output, &Config::default()).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r#"
        batch_size = 10
        max_queue_size = 1000
        dedup_window_ms = 5000
        session_timeout_ms = 300000
        context_switch_threshold_ms = 60000
        terminator_patterns = ["^\\s*(exit|logout)\\s*$"]
        "#);
    }
}
