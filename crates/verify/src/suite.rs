//! 검증 스위트 실행기
//!
//! [`TestSuite`]는 선언된 [`TestCase`]를 **엄격하게 순서대로** 실행합니다.
//! 뒤의 케이스가 앞 케이스의 부수 효과(리소스 생성 등)에 의존할 수 있으므로
//! 두 케이스가 동시에 실행되는 일은 없습니다.
//!
//! # 판정 규칙
//!
//! | 상황 | 결과 |
//! |------|------|
//! | 스킵 조건 충족 | Skip (프로브 실행 안 함) |
//! | 프로브 설정 오류 / 전송 오류 | Fail |
//! | `expect` 설정, 출력에 포함 | Pass |
//! | `expect` 설정, 출력에 없음 | Fail |
//! | `expect` 없음, 프로브 판정 성공 | Pass |
//! | 그 외 | Fail |
//!
//! Fail은 스위트를 중단하지 않습니다. 취소되면 남은 케이스는 Skip으로 기록됩니다.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stackgate_core::error::ProbeError;
use stackgate_core::metrics as m;
use stackgate_core::probe::{ProbeClient, ProbeOutcome};
use stackgate_core::topology::Topology;
use stackgate_core::types::{SkipCondition, SkipContext, TestCase, TestStatus};

/// 준비 상태 스냅샷 케이스의 카테고리
pub const READINESS_CATEGORY: &str = "readiness";

const CANCELLED_REASON: &str = "run cancelled";

/// 케이스 하나의 실행 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResult {
    /// 케이스 이름
    pub name: String,
    /// 카테고리
    pub category: String,
    /// 판정
    pub status: TestStatus,
    /// 프로브가 캡처한 출력
    pub captured_output: String,
    /// 실행 시간 (밀리초, 스킵은 0)
    pub duration_ms: u64,
    /// 실패/스킵 사유
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TestResult {
    /// 스킵 결과를 생성합니다.
    pub fn skipped(
        name: impl Into<String>,
        category: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            status: TestStatus::Skip,
            captured_output: String::new(),
            duration_ms: 0,
            detail: Some(reason.into()),
        }
    }
}

/// 한 번의 스위트 실행 결과
///
/// 결과 목록만 보관하고 카운트는 항상 목록에서 계산하므로
/// `total == passed + failed + skipped`가 구조적으로 유지됩니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    results: Vec<TestResult>,
    /// 취소 신호로 중단된 실행인지 여부
    cancelled: bool,
}

impl RunReport {
    /// 결과를 추가한 새 보고서를 반환합니다.
    pub fn with_result(mut self, result: TestResult) -> Self {
        self.results.push(result);
        self
    }

    /// 취소된 실행으로 표시한 새 보고서를 반환합니다.
    pub fn into_cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }

    /// 취소 신호로 중단되었는지 확인합니다.
    ///
    /// 취소된 실행은 실패가 없어도 성공으로 보지 않습니다.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// 실행 순서대로의 결과
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn passed(&self) -> usize {
        self.count(TestStatus::Pass)
    }

    pub fn failed(&self) -> usize {
        self.count(TestStatus::Fail)
    }

    pub fn skipped(&self) -> usize {
        self.count(TestStatus::Skip)
    }

    /// 실패한 케이스
    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results
            .iter()
            .filter(|r| r.status == TestStatus::Fail)
    }

    fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

impl FromIterator<TestResult> for RunReport {
    fn from_iter<I: IntoIterator<Item = TestResult>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), Self::with_result)
    }
}

/// 검증 스위트 실행기
pub struct TestSuite<P: ProbeClient> {
    client: Arc<P>,
}

impl<P: ProbeClient> TestSuite<P> {
    /// 새 실행기를 생성합니다.
    pub fn new(client: Arc<P>) -> Self {
        Self { client }
    }

    /// 케이스를 선언 순서대로 실행합니다.
    pub async fn run(
        &self,
        cases: &[TestCase],
        context: &SkipContext,
        cancel: &CancellationToken,
    ) -> RunReport {
        info!(cases = cases.len(), "running verification suite");

        let mut report = RunReport::default();
        for case in cases {
            let result = if cancel.is_cancelled() {
                TestResult::skipped(&case.name, &case.category, CANCELLED_REASON)
            } else {
                self.run_case(case, context, cancel).await
            };
            record(&result);
            report = report.with_result(result);
        }

        if cancel.is_cancelled() {
            warn!(skipped = report.skipped(), "verification suite cancelled");
            report = report.into_cancelled();
        }

        info!(
            total = report.total(),
            passed = report.passed(),
            failed = report.failed(),
            skipped = report.skipped(),
            "verification suite finished"
        );
        report
    }

    /// 모든 서비스의 readiness 프로브를 한 번씩 실행합니다.
    ///
    /// 프로브가 없거나 바이패스된 서비스는 Skip입니다.
    pub async fn readiness_snapshot(
        &self,
        topology: &Topology,
        cancel: &CancellationToken,
    ) -> RunReport {
        let context = SkipContext::default();
        let mut report = RunReport::default();

        for service in topology.services() {
            let result = match (&service.readiness, service.bypass) {
                _ if cancel.is_cancelled() => {
                    TestResult::skipped(&service.name, READINESS_CATEGORY, CANCELLED_REASON)
                }
                (_, true) => TestResult::skipped(
                    &service.name,
                    READINESS_CATEGORY,
                    format!("service {} is bypassed", service.name),
                ),
                (None, false) => TestResult::skipped(
                    &service.name,
                    READINESS_CATEGORY,
                    "no readiness probe declared",
                ),
                (Some(probe), false) => {
                    let case = TestCase::new(&service.name, READINESS_CATEGORY, probe.clone());
                    self.run_case(&case, &context, cancel).await
                }
            };
            record(&result);
            report = report.with_result(result);
        }

        if cancel.is_cancelled() {
            report = report.into_cancelled();
        }
        report
    }

    async fn run_case(
        &self,
        case: &TestCase,
        context: &SkipContext,
        cancel: &CancellationToken,
    ) -> TestResult {
        if let Some(condition) = &case.skip_if
            && let Some(reason) = self.skip_reason(condition, context).await
        {
            debug!(case = %case.name, reason = %reason, "skipping case");
            return TestResult::skipped(&case.name, &case.category, reason);
        }

        let started = Instant::now();
        let outcome = tokio::select! {
            outcome = self.client.execute(&case.probe) => outcome,
            () = cancel.cancelled() => {
                return TestResult::skipped(&case.name, &case.category, CANCELLED_REASON);
            }
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (status, captured_output, detail) = classify(case, outcome);
        TestResult {
            name: case.name.clone(),
            category: case.category.clone(),
            status,
            captured_output,
            duration_ms,
            detail,
        }
    }

    async fn skip_reason(&self, condition: &SkipCondition, context: &SkipContext) -> Option<String> {
        match condition {
            SkipCondition::ProbeFails { probe } => match self.client.execute(probe).await {
                Ok(outcome) if outcome.success => None,
                Ok(_) | Err(_) => Some(format!("precondition probe failed: {}", probe.target())),
            },
            other => other.evaluate_static(context),
        }
    }
}

/// 프로브 결과를 케이스 판정으로 변환합니다.
fn classify(
    case: &TestCase,
    outcome: Result<ProbeOutcome, ProbeError>,
) -> (TestStatus, String, Option<String>) {
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => return (TestStatus::Fail, String::new(), Some(e.to_string())),
    };

    if let Some(error) = outcome.error {
        return (TestStatus::Fail, outcome.output, Some(error));
    }

    match &case.expect {
        Some(expected) if outcome.output.contains(expected.as_str()) => {
            (TestStatus::Pass, outcome.output, None)
        }
        Some(expected) => (
            TestStatus::Fail,
            outcome.output,
            Some(format!("output does not contain '{expected}'")),
        ),
        None if outcome.success => (TestStatus::Pass, outcome.output, None),
        None => (
            TestStatus::Fail,
            outcome.output,
            Some(format!(
                "{} predicate did not match",
                case.probe.predicate().name()
            )),
        ),
    }
}

fn record(result: &TestResult) {
    metrics::counter!(m::TEST_RESULTS_TOTAL, m::LABEL_STATUS => result.status.as_str())
        .increment(1);

    match result.status {
        TestStatus::Fail => warn!(
            case = %result.name,
            category = %result.category,
            detail = result.detail.as_deref().unwrap_or(""),
            "case failed"
        ),
        status => info!(case = %result.name, status = %status, duration_ms = result.duration_ms, "case finished"),
    }
}
