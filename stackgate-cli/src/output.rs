//! Output formatting abstraction for text vs JSON rendering
//!
//! All subcommand output flows through [`OutputWriter`] which handles format switching.
//! This keeps format-specific logic out of command handlers entirely.

use std::io::Write;

use colored::{ColoredString, Colorize};
use serde::Serialize;

use stackgate_core::gate::ReadinessOutcome;
use stackgate_core::types::TestStatus;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Writes command payloads to stdout in the selected format.
///
/// Logs go to stderr, so stdout stays parseable in JSON mode.
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render a payload to stdout.
    pub fn render<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render_to(payload, &mut handle)
    }

    /// Render a payload to an arbitrary writer.
    pub fn render_to<T: Render + Serialize>(
        &self,
        payload: &T,
        w: &mut dyn Write,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => payload.render_text(w)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, payload)?;
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

/// Trait for human-readable text rendering.
///
/// Implemented by every CLI output payload alongside `serde::Serialize`.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

/// Colored label for a case status.
pub fn status_label(status: TestStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        TestStatus::Pass => label.green().bold(),
        TestStatus::Fail => label.red().bold(),
        TestStatus::Skip => label.yellow(),
    }
}

/// One line per gated service.
pub fn render_readiness(w: &mut dyn Write, outcomes: &[ReadinessOutcome]) -> std::io::Result<()> {
    for outcome in outcomes {
        let state = if outcome.succeeded {
            "READY".green().bold()
        } else if outcome.cancelled {
            "CANCELLED".yellow()
        } else {
            "UNREADY".red().bold()
        };
        writeln!(
            w,
            "  {:<20} {state:<10} attempts={} elapsed={:.1}s",
            outcome.service,
            outcome.attempts_used,
            outcome.elapsed.as_secs_f64()
        )?;
        if !outcome.succeeded
            && let Some(error) = &outcome.last_error
        {
            writeln!(w, "  {:<20} {}", "", error.dimmed())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[derive(Serialize)]
    struct PhaseLine {
        index: usize,
        services: Vec<String>,
    }

    impl Render for PhaseLine {
        fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
            writeln!(w, "Phase {}: {}", self.index, self.services.join(", "))
        }
    }

    fn sample() -> PhaseLine {
        PhaseLine {
            index: 1,
            services: vec!["spicedb".to_owned(), "kafka".to_owned()],
        }
    }

    #[test]
    fn test_render_text_format() {
        let mut buffer = Vec::new();
        OutputWriter::new(OutputFormat::Text)
            .render_to(&sample(), &mut buffer)
            .expect("text rendering should succeed");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert_eq!(output, "Phase 1: spicedb, kafka\n");
    }

    #[test]
    fn test_render_json_format() {
        let mut buffer = Vec::new();
        OutputWriter::new(OutputFormat::Json)
            .render_to(&sample(), &mut buffer)
            .expect("json rendering should succeed");
        let parsed: serde_json::Value = serde_json::from_slice(&buffer).expect("valid JSON");
        assert_eq!(parsed["index"], 1);
        assert_eq!(parsed["services"][1], "kafka");
    }

    #[test]
    fn test_render_readiness_shows_error_for_unready() {
        colored::control::set_override(false);
        let outcomes = vec![
            ReadinessOutcome::ready_without_probe("cache"),
            ReadinessOutcome {
                service: "kafka".to_owned(),
                attempts_used: 30,
                succeeded: false,
                elapsed: Duration::from_secs(58),
                last_output: String::new(),
                last_error: Some("connection refused".to_owned()),
                cancelled: false,
            },
        ];

        let mut buffer = Vec::new();
        render_readiness(&mut buffer, &outcomes).expect("render");
        let output = String::from_utf8(buffer).expect("valid UTF-8");

        assert!(output.contains("cache"));
        assert!(output.contains("READY"));
        assert!(output.contains("UNREADY"));
        assert!(output.contains("attempts=30 elapsed=58.0s"));
        assert!(output.contains("connection refused"));
    }

    #[test]
    fn test_status_label_text() {
        colored::control::set_override(false);
        assert_eq!(status_label(TestStatus::Pass).to_string(), "PASS");
        assert_eq!(status_label(TestStatus::Skip).to_string(), "SKIP");
    }
}
