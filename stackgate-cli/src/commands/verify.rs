//! `stackgate verify` command handler

use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use stackgate_core::config::StackConfig;
use stackgate_core::gate::ReadinessOutcome;
use stackgate_core::types::SkipContext;
use stackgate_verify::{ReportGenerator, RunReport, Summary, TestResult, TestSuite};

use crate::cli::VerifyArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, status_label};

/// Execute the `verify` command against an already running stack.
pub async fn execute(
    args: VerifyArgs,
    config: &StackConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let topology = super::resolve_topology(config, &args.skip)?;
    let client = super::probe_client(config)?;
    let cancel = super::cancel_on_interrupt();

    let report = TestSuite::new(client)
        .run(&config.tests, &SkipContext::new(topology.bypassed()), &cancel)
        .await;
    let suite = SuiteReport::finish(config, report, &[]).await?;

    writer.render(&suite)?;
    suite.into_result()
}

/// Suite results plus where the artifacts went.
#[derive(Debug, Serialize)]
pub struct SuiteReport {
    pub summary: Summary,
    pub results: Vec<TestResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_dir: Option<PathBuf>,
}

impl SuiteReport {
    /// Summarizes and, unless disabled, persists the run.
    pub async fn finish(
        config: &StackConfig,
        report: RunReport,
        readiness: &[ReadinessOutcome],
    ) -> Result<Self, CliError> {
        let summary = ReportGenerator::summarize(&report, readiness);
        let report_dir = ReportGenerator::new(&config.verify.output_dir)
            .with_artifacts(config.verify.write_artifacts)
            .persist(&report, &summary)
            .await?;
        info!(path = %report_dir.display(), failed = summary.failed, "verification report written");

        Ok(Self {
            summary,
            results: report.results().to_vec(),
            report_dir: Some(report_dir),
        })
    }

    /// Summary without persisting anything.
    pub fn in_memory(report: &RunReport) -> Self {
        Self {
            summary: ReportGenerator::summarize(report, &[]),
            results: report.results().to_vec(),
            report_dir: None,
        }
    }

    /// `Unhealthy` when any case failed or the run was cancelled.
    pub fn into_result(self) -> Result<(), CliError> {
        if self.summary.succeeded() {
            Ok(())
        } else if self.summary.failed == 0 {
            Err(CliError::Unhealthy(format!(
                "verification cancelled ({} of {} case(s) skipped)",
                self.summary.skipped, self.summary.total
            )))
        } else {
            let names: Vec<&str> = self.summary.failures.iter().map(|f| f.name.as_str()).collect();
            Err(CliError::Unhealthy(format!(
                "{} check(s) failed: {}",
                self.summary.failed,
                names.join(", ")
            )))
        }
    }
}

impl Render for SuiteReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for result in &self.results {
            write!(
                w,
                "  {:<4} {:<36} {:<12}",
                status_label(result.status),
                result.name,
                result.category
            )?;
            match &result.detail {
                Some(detail) => writeln!(w, " {}", detail.dimmed())?,
                None => writeln!(w)?,
            }
        }

        writeln!(w)?;
        write!(w, "{}", self.summary)?;

        if let Some(dir) = &self.report_dir {
            writeln!(w)?;
            writeln!(w, "Report: {}", dir.display().to_string().bold())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use stackgate_core::types::TestStatus;

    use super::*;

    fn result(name: &str, status: TestStatus) -> TestResult {
        TestResult {
            name: name.to_owned(),
            category: "relations".to_owned(),
            status,
            captured_output: String::new(),
            duration_ms: 3,
            detail: (status == TestStatus::Fail).then(|| "HTTP 500".to_owned()),
        }
    }

    #[test]
    fn test_passing_suite_is_ok() {
        let report: RunReport = [result("a", TestStatus::Pass), result("b", TestStatus::Skip)]
            .into_iter()
            .collect();
        assert!(SuiteReport::in_memory(&report).into_result().is_ok());
    }

    #[test]
    fn test_failing_suite_is_unhealthy_and_names_cases() {
        let report: RunReport = [result("a", TestStatus::Pass), result("b", TestStatus::Fail)]
            .into_iter()
            .collect();
        let err = SuiteReport::in_memory(&report).into_result().unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("1 check(s) failed: b"));
    }

    #[test]
    fn test_cancelled_suite_is_unhealthy() {
        let report = RunReport::default()
            .with_result(result("a", TestStatus::Pass))
            .with_result(TestResult::skipped("b", "relations", "run cancelled"))
            .into_cancelled();

        let err = SuiteReport::in_memory(&report).into_result().unwrap_err();

        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("verification cancelled (1 of 2 case(s) skipped)"));
    }

    #[test]
    fn test_render_text_lists_every_case() {
        colored::control::set_override(false);
        let report: RunReport = [result("livez", TestStatus::Pass), result("tuples", TestStatus::Fail)]
            .into_iter()
            .collect();
        let mut buffer = Vec::new();
        SuiteReport::in_memory(&report)
            .render_text(&mut buffer)
            .expect("render");
        let text = String::from_utf8(buffer).expect("utf8");

        assert!(text.contains("PASS"));
        assert!(text.contains("livez"));
        assert!(text.contains("FAIL"));
        assert!(text.contains("HTTP 500"));
        assert!(text.contains("total:   2"));
    }

    #[tokio::test]
    async fn test_finish_persists_under_output_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = StackConfig::default();
        config.verify.output_dir = dir.path().display().to_string();
        let report: RunReport = [result("livez", TestStatus::Pass)].into_iter().collect();

        let suite = SuiteReport::finish(&config, report, &[]).await.expect("finish");

        let report_dir = suite.report_dir.expect("persisted");
        assert!(report_dir.starts_with(dir.path()));
        assert!(report_dir.join("summary.json").is_file());
        assert!(report_dir.join("001-livez.log").is_file());
    }
}
