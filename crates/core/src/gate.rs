//! 준비 게이트 -- 프로브가 성공할 때까지 제한된 횟수만큼 반복 실행
//!
//! [`ReadinessGate`]는 서비스 하나의 readiness 프로브를 고정 간격으로
//! 재시도합니다. 첫 시도는 즉시 실행되며, 마지막 시도 이후에는 대기하지
//! 않습니다. 따라서 최악의 대기 시간은 다음과 같이 계산됩니다:
//!
//! ```text
//! max_attempts × probe_timeout + (max_attempts − 1) × interval
//! ```
//!
//! # 종료 조건
//! - 프로브 성공 → `succeeded = true`
//! - 시도 횟수 소진 → `succeeded = false`
//! - 취소 토큰 발동 → `cancelled = true`
//! - 프로브 설정 오류 → 즉시 종료 (재시도해도 통과할 수 없음)

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics as m;
use crate::probe::{Probe, ProbeClient};

/// 게이트 재시도 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    /// 시도 사이의 대기 간격
    pub interval: Duration,
    /// 최대 시도 횟수 (1 이상)
    pub max_attempts: u32,
}

impl GatePolicy {
    /// 새 정책을 생성합니다. `max_attempts`가 0이면 1로 보정합니다.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// 서비스별 오버라이드를 병합한 정책을 반환합니다.
    pub fn with_override(self, over: Option<&GateOverride>) -> Self {
        match over {
            Some(over) => Self::new(
                over.interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.interval),
                over.max_attempts.unwrap_or(self.max_attempts),
            ),
            None => self,
        }
    }

    /// 게이트가 실패로 판정되기까지 걸릴 수 있는 최대 시간
    pub fn worst_case_wait(&self, probe_timeout: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        probe_timeout * attempts + self.interval * (attempts - 1)
    }
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), 30)
    }
}

/// 서비스별 게이트 정책 오버라이드 (설정 파일의 `[services.gate]`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateOverride {
    /// 시도 간격 (밀리초)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    /// 최대 시도 횟수
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

/// 게이트 실행 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessOutcome {
    /// 서비스 이름
    pub service: String,
    /// 실제로 실행된 프로브 횟수
    pub attempts_used: u32,
    /// 프로브가 성공했는지 여부
    pub succeeded: bool,
    /// 게이트 시작부터 종료까지 걸린 시간
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
    /// 마지막 시도에서 캡처한 출력
    pub last_output: String,
    /// 마지막 시도의 전송/설정 오류
    pub last_error: Option<String>,
    /// 취소로 인해 종료되었는지 여부
    pub cancelled: bool,
}

impl ReadinessOutcome {
    /// 프로브 없이 시작만으로 준비 완료로 간주되는 서비스의 결과
    pub fn ready_without_probe(service: &str) -> Self {
        Self {
            service: service.to_owned(),
            attempts_used: 0,
            succeeded: true,
            elapsed: Duration::ZERO,
            last_output: String::new(),
            last_error: None,
            cancelled: false,
        }
    }

    /// 컨테이너 시작 실패처럼 게이트에 도달하지 못한 서비스의 결과
    pub fn not_started(service: &str, reason: impl Into<String>) -> Self {
        Self {
            service: service.to_owned(),
            attempts_used: 0,
            succeeded: false,
            elapsed: Duration::ZERO,
            last_output: String::new(),
            last_error: Some(reason.into()),
            cancelled: false,
        }
    }
}

/// 준비 게이트
///
/// 프로브 클라이언트를 `Arc`로 공유하므로 같은 phase의 여러 서비스가
/// 동시에 게이트를 기다릴 수 있습니다.
pub struct ReadinessGate<P: ProbeClient> {
    client: Arc<P>,
}

impl<P: ProbeClient> Clone for ReadinessGate<P> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<P: ProbeClient> ReadinessGate<P> {
    /// 새 게이트를 생성합니다.
    pub fn new(client: Arc<P>) -> Self {
        Self { client }
    }

    /// 내부 프로브 클라이언트를 반환합니다.
    pub fn client(&self) -> &Arc<P> {
        &self.client
    }

    /// 프로브가 성공하거나 시도 횟수가 소진될 때까지 대기합니다.
    ///
    /// 정확히 `policy.max_attempts`번 이하로 프로브를 실행하며,
    /// `k`번째 시도에서 성공하면 정확히 `k`번 실행합니다.
    pub async fn wait_until_ready(
        &self,
        service: &str,
        probe: &Probe,
        policy: GatePolicy,
        cancel: &CancellationToken,
    ) -> ReadinessOutcome {
        let started = Instant::now();
        let max_attempts = policy.max_attempts.max(1);
        let mut outcome = ReadinessOutcome {
            service: service.to_owned(),
            attempts_used: 0,
            succeeded: false,
            elapsed: Duration::ZERO,
            last_output: String::new(),
            last_error: None,
            cancelled: false,
        };

        info!(
            service,
            probe = probe.kind_name(),
            target = %probe.target(),
            max_attempts,
            interval_ms = policy.interval.as_millis() as u64,
            "waiting for service readiness"
        );

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            outcome.attempts_used = attempt;
            metrics::counter!(m::PROBE_ATTEMPTS_TOTAL, m::LABEL_SERVICE => service.to_owned())
                .increment(1);

            let result = tokio::select! {
                result = self.client.execute(probe) => result,
                () = cancel.cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
            };

            match result {
                Ok(probe_outcome) => {
                    outcome.last_output = probe_outcome.output;
                    outcome.last_error = probe_outcome.error;
                    if probe_outcome.success {
                        outcome.succeeded = true;
                        break;
                    }
                    debug!(
                        service,
                        attempt,
                        max_attempts,
                        error = outcome.last_error.as_deref().unwrap_or(""),
                        "readiness probe not yet passing"
                    );
                }
                Err(e) => {
                    warn!(service, error = %e, "readiness probe is misconfigured, giving up");
                    outcome.last_error = Some(e.to_string());
                    break;
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    () = tokio::time::sleep(policy.interval) => {}
                    () = cancel.cancelled() => {
                        outcome.cancelled = true;
                        break;
                    }
                }
            }
        }

        outcome.elapsed = started.elapsed();
        metrics::histogram!(m::READINESS_WAIT_SECONDS, m::LABEL_SERVICE => service.to_owned())
            .record(outcome.elapsed.as_secs_f64());

        if outcome.succeeded {
            info!(
                service,
                attempts = outcome.attempts_used,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "service is ready"
            );
        } else if outcome.cancelled {
            warn!(service, attempts = outcome.attempts_used, "readiness wait cancelled");
        } else {
            warn!(
                service,
                attempts = outcome.attempts_used,
                last_error = outcome.last_error.as_deref().unwrap_or(""),
                "service did not become ready"
            );
        }

        outcome
    }
}

/// `Duration`을 밀리초 정수로 직렬화
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::ProbeError;
    use crate::probe::ProbeOutcome;

    /// 호출 횟수를 기록하고, `succeed_on`번째 호출부터 성공하는 mock 클라이언트
    struct CountingClient {
        calls: AtomicU32,
        succeed_on: Option<u32>,
        invalid: bool,
    }

    impl CountingClient {
        fn failing() -> Self {
            Self {
                calls: AtomicU32::new(0),
                succeed_on: None,
                invalid: false,
            }
        }

        fn succeeding_on(k: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                succeed_on: Some(k),
                invalid: false,
            }
        }

        fn misconfigured() -> Self {
            Self {
                calls: AtomicU32::new(0),
                succeed_on: None,
                invalid: true,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ProbeClient for CountingClient {
        async fn execute(&self, _probe: &Probe) -> Result<ProbeOutcome, ProbeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.invalid {
                return Err(ProbeError::InvalidTarget {
                    target: "nowhere".to_owned(),
                    reason: "bad".to_owned(),
                });
            }
            match self.succeed_on {
                Some(k) if call >= k => Ok(ProbeOutcome {
                    success: true,
                    output: format!("ok on {call}"),
                    error: None,
                }),
                _ => Ok(ProbeOutcome::transport_error("connection refused", "")),
            }
        }
    }

    fn policy(attempts: u32) -> GatePolicy {
        GatePolicy::new(Duration::from_secs(2), attempts)
    }

    #[test]
    fn worst_case_wait_counts_intervals_between_attempts_only() {
        let policy = GatePolicy::new(Duration::from_secs(2), 30);
        assert_eq!(
            policy.worst_case_wait(Duration::from_secs(5)),
            Duration::from_secs(30 * 5 + 29 * 2)
        );
        let single = GatePolicy::new(Duration::from_secs(2), 1);
        assert_eq!(
            single.worst_case_wait(Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn override_merges_individual_fields() {
        let base = GatePolicy::new(Duration::from_secs(2), 30);
        let merged = base.with_override(Some(&GateOverride {
            interval_ms: None,
            max_attempts: Some(60),
        }));
        assert_eq!(merged.interval, Duration::from_secs(2));
        assert_eq!(merged.max_attempts, 60);
        assert_eq!(base.with_override(None), base);
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(GatePolicy::new(Duration::ZERO, 0).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_probe_runs_exactly_max_attempts() {
        let client = Arc::new(CountingClient::failing());
        let gate = ReadinessGate::new(Arc::clone(&client));

        let outcome = gate
            .wait_until_ready("db", &Probe::tcp("db:5432"), policy(5), &CancellationToken::new())
            .await;

        assert!(!outcome.succeeded);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.attempts_used, 5);
        assert_eq!(client.calls(), 5);
        assert_eq!(outcome.last_error.as_deref(), Some("connection refused"));
        // 마지막 시도 이후에는 대기하지 않음: 4번의 간격만 경과
        assert_eq!(outcome.elapsed, Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeding_probe_stops_at_first_success() {
        let client = Arc::new(CountingClient::succeeding_on(3));
        let gate = ReadinessGate::new(Arc::clone(&client));

        let outcome = gate
            .wait_until_ready("engine", &Probe::tcp("engine:9000"), policy(30), &CancellationToken::new())
            .await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts_used, 3);
        assert_eq!(client.calls(), 3);
        assert_eq!(outcome.last_output, "ok on 3");
        assert_eq!(outcome.last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_runs_without_delay() {
        let client = Arc::new(CountingClient::succeeding_on(1));
        let gate = ReadinessGate::new(Arc::clone(&client));

        let outcome = gate
            .wait_until_ready("api", &Probe::tcp("api:8000"), policy(10), &CancellationToken::new())
            .await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts_used, 1);
        assert_eq!(outcome.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn misconfigured_probe_ends_gate_immediately() {
        let client = Arc::new(CountingClient::misconfigured());
        let gate = ReadinessGate::new(Arc::clone(&client));

        let outcome = gate
            .wait_until_ready("api", &Probe::tcp("api:8000"), policy(10), &CancellationToken::new())
            .await;

        assert!(!outcome.succeeded);
        assert_eq!(client.calls(), 1);
        assert!(outcome.last_error.unwrap().contains("nowhere"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_sleep_stops_polling() {
        let client = Arc::new(CountingClient::failing());
        let gate = ReadinessGate::new(Arc::clone(&client));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let outcome = gate
            .wait_until_ready("db", &Probe::tcp("db:5432"), policy(30), &cancel)
            .await;

        assert!(outcome.cancelled);
        assert!(!outcome.succeeded);
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn already_cancelled_token_runs_no_probe() {
        let client = Arc::new(CountingClient::failing());
        let gate = ReadinessGate::new(Arc::clone(&client));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = gate
            .wait_until_ready("db", &Probe::tcp("db:5432"), policy(3), &cancel)
            .await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.attempts_used, 0);
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn outcome_serializes_elapsed_as_millis() {
        let mut outcome = ReadinessOutcome::ready_without_probe("cache");
        outcome.elapsed = Duration::from_millis(1500);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["elapsed"], 1500);
        assert_eq!(json["service"], "cache");
    }
}
