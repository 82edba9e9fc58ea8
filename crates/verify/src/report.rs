//! 보고서 생성 및 아티팩트 저장
//!
//! [`ReportGenerator::summarize`]는 [`RunReport`]와 배포 중 수집된
//! [`ReadinessOutcome`]을 [`Summary`]로 집계합니다. [`ReportGenerator::persist`]는
//! 실행마다 고유한 디렉토리에 요약과 케이스별 캡처 출력을 기록합니다.
//!
//! # 아티팩트 레이아웃
//!
//! ```text
//! <output_dir>/
//! └── run-20250101T120000Z-1a2b3c4d/
//!     ├── summary.json
//!     ├── summary.txt
//!     ├── 001-relations-api-livez.log
//!     └── 002-relations-api-unknown-route.log
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use stackgate_core::gate::ReadinessOutcome;
use stackgate_core::types::TestStatus;

use crate::error::VerifyError;
use crate::suite::{RunReport, TestResult};

/// 카테고리별 집계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl CategoryCounts {
    fn add(&mut self, status: TestStatus) {
        self.total += 1;
        match status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Fail => self.failed += 1,
            TestStatus::Skip => self.skipped += 1,
        }
    }
}

/// 실패한 케이스 요약
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedCase {
    pub name: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// 실행 요약
///
/// 같은 입력에 대해 항상 같은 내용을 만듭니다 (시각 정보는 디렉토리 이름에만 포함).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// 카테고리 이름순 집계
    pub categories: BTreeMap<String, CategoryCounts>,
    /// 실행 순서대로의 실패 케이스
    pub failures: Vec<FailedCase>,
    /// 배포 중 게이트 이력
    pub readiness: Vec<ReadinessOutcome>,
    /// 취소 신호로 중단된 실행
    pub cancelled: bool,
}

impl Summary {
    /// 실패가 있거나 실행이 취소되었으면 1, 아니면 0 (Skip은 실패가 아님)
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() { 0 } else { 1 }
    }

    pub fn succeeded(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Verification summary")?;
        writeln!(f, "  total:   {}", self.total)?;
        writeln!(f, "  passed:  {}", self.passed)?;
        writeln!(f, "  failed:  {}", self.failed)?;
        writeln!(f, "  skipped: {}", self.skipped)?;
        if self.cancelled {
            writeln!(f, "  run cancelled before completion")?;
        }

        if !self.categories.is_empty() {
            writeln!(f)?;
            writeln!(f, "By category:")?;
            for (category, counts) in &self.categories {
                writeln!(
                    f,
                    "  {category:<16} total={} passed={} failed={} skipped={}",
                    counts.total, counts.passed, counts.failed, counts.skipped
                )?;
            }
        }

        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failed cases:")?;
            for failure in &self.failures {
                match &failure.detail {
                    Some(detail) => {
                        writeln!(f, "  - {} [{}]: {detail}", failure.name, failure.category)?
                    }
                    None => writeln!(f, "  - {} [{}]", failure.name, failure.category)?,
                }
            }
        }

        if !self.readiness.is_empty() {
            writeln!(f)?;
            writeln!(f, "Readiness:")?;
            for outcome in &self.readiness {
                let state = if outcome.succeeded {
                    "ready"
                } else if outcome.cancelled {
                    "cancelled"
                } else {
                    "unready"
                };
                writeln!(
                    f,
                    "  {:<16} {state:<9} attempts={} elapsed_ms={}",
                    outcome.service,
                    outcome.attempts_used,
                    outcome.elapsed.as_millis()
                )?;
            }
        }

        Ok(())
    }
}

/// `summary.json`의 전체 내용
#[derive(Serialize)]
struct PersistedRun<'a> {
    summary: &'a Summary,
    results: &'a [TestResult],
}

/// 보고서 생성기
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    output_dir: PathBuf,
    write_artifacts: bool,
}

impl ReportGenerator {
    /// `output_dir` 아래에 실행 디렉토리를 만드는 생성기를 반환합니다.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            write_artifacts: true,
        }
    }

    /// 케이스별 캡처 출력 파일 저장 여부를 설정합니다.
    pub fn with_artifacts(mut self, write_artifacts: bool) -> Self {
        self.write_artifacts = write_artifacts;
        self
    }

    /// 실행 결과와 게이트 이력을 요약합니다.
    pub fn summarize(report: &RunReport, readiness: &[ReadinessOutcome]) -> Summary {
        let mut categories: BTreeMap<String, CategoryCounts> = BTreeMap::new();
        for result in report.results() {
            categories
                .entry(result.category.clone())
                .or_default()
                .add(result.status);
        }

        Summary {
            total: report.total(),
            passed: report.passed(),
            failed: report.failed(),
            skipped: report.skipped(),
            categories,
            failures: report
                .failures()
                .map(|r| FailedCase {
                    name: r.name.clone(),
                    category: r.category.clone(),
                    detail: r.detail.clone(),
                })
                .collect(),
            readiness: readiness.to_vec(),
            cancelled: report.was_cancelled(),
        }
    }

    /// 요약과 아티팩트를 새 실행 디렉토리에 기록하고 그 경로를 반환합니다.
    ///
    /// # Errors
    ///
    /// 디렉토리 생성 또는 파일 쓰기에 실패하면 `VerifyError::Io`를 반환합니다.
    pub async fn persist(
        &self,
        report: &RunReport,
        summary: &Summary,
    ) -> Result<PathBuf, VerifyError> {
        let run_dir = self
            .output_dir
            .join(run_dir_name(Utc::now(), Uuid::new_v4()));
        tokio::fs::create_dir_all(&run_dir)
            .await
            .map_err(|e| io_error(&run_dir, e))?;

        let json = serde_json::to_vec_pretty(&PersistedRun {
            summary,
            results: report.results(),
        })?;
        write(&run_dir.join("summary.json"), json).await?;
        write(&run_dir.join("summary.txt"), summary.to_string()).await?;

        if self.write_artifacts {
            for (index, result) in report.results().iter().enumerate() {
                let file = run_dir.join(artifact_file_name(index + 1, &result.name));
                write(&file, render_artifact(result)).await?;
            }
        }

        info!(
            path = %run_dir.display(),
            artifacts = if self.write_artifacts { report.total() } else { 0 },
            "report written"
        );
        Ok(run_dir)
    }
}

/// 실행 디렉토리 이름: `run-<UTC 시각>-<8자리 hex>`
pub fn run_dir_name(now: DateTime<Utc>, id: Uuid) -> String {
    let simple = id.simple().to_string();
    format!("run-{}-{}", now.format("%Y%m%dT%H%M%SZ"), &simple[..8])
}

/// 케이스 아티팩트 파일 이름: `NNN-<slug>.log`
pub fn artifact_file_name(position: usize, name: &str) -> String {
    format!("{position:03}-{}.log", slug(name))
}

fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "case".to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn render_artifact(result: &TestResult) -> String {
    let mut out = format!(
        "name: {}\ncategory: {}\nstatus: {}\nduration_ms: {}\n",
        result.name, result.category, result.status, result.duration_ms
    );
    if let Some(detail) = &result.detail {
        out.push_str(&format!("detail: {detail}\n"));
    }
    out.push('\n');
    out.push_str(&result.captured_output);
    if !result.captured_output.ends_with('\n') {
        out.push('\n');
    }
    out
}

async fn write(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), VerifyError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, source: std::io::Error) -> VerifyError {
    VerifyError::Io {
        path: path.display().to_string(),
        source,
    }
}
