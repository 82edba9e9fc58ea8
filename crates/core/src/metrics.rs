//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! 레코더가 설치되지 않은 상태에서의 기록은 아무 동작도 하지 않으므로,
//! 익스포터를 띄우지 않는 `deploy`/`verify` 실행에서도 안전합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `stackgate_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(stackgate_core::metrics::PROBE_ATTEMPTS_TOTAL, "service" => "db").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 서비스 레이블 키
pub const LABEL_SERVICE: &str = "service";

/// 케이스 판정 레이블 키 (pass, fail, skip)
pub const LABEL_STATUS: &str = "status";

/// 익스포터 대상 레이블 키
pub const LABEL_JOB: &str = "job";

/// 버전 레이블 키
pub const LABEL_VERSION: &str = "version";

// ─── 게이트 메트릭 ──────────────────────────────────────────────────

/// Gate: 실행된 readiness 프로브 수 (counter, label: service)
pub const PROBE_ATTEMPTS_TOTAL: &str = "stackgate_probe_attempts_total";

/// Gate: 게이트 대기 시간 (histogram, 초, label: service)
pub const READINESS_WAIT_SECONDS: &str = "stackgate_readiness_wait_seconds";

// ─── 검증 메트릭 ────────────────────────────────────────────────────

/// Verify: 판정된 케이스 수 (counter, label: status)
pub const TEST_RESULTS_TOTAL: &str = "stackgate_test_results_total";

// ─── 익스포터 메트릭 ────────────────────────────────────────────────

/// Exporter: 서비스 상태 (gauge, 1 = up, 0 = down, label: job)
pub const SERVICE_UP: &str = "stackgate_service_up";

/// 빌드 정보 (gauge, 항상 1, label: version)
pub const BUILD_INFO: &str = "stackgate_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 게이트 대기 시간 히스토그램 버킷 (초)
///
/// 즉시 준비 ~ 기본 설정의 최악 대기 시간(약 208초) 범위
pub const READINESS_WAIT_BUCKETS: [f64; 10] =
    [0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 240.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `stackgate export` 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        PROBE_ATTEMPTS_TOTAL,
        "Total number of readiness probe attempts per service"
    );
    describe_histogram!(
        READINESS_WAIT_SECONDS,
        "Time spent waiting for a service to become ready in seconds"
    );
    describe_counter!(
        TEST_RESULTS_TOTAL,
        "Total number of verification test results by status"
    );
    describe_gauge!(
        SERVICE_UP,
        "Whether the service readiness probe passed on the last scrape (1 = up)"
    );
    describe_gauge!(BUILD_INFO, "Build information (always 1, with version label)");
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        PROBE_ATTEMPTS_TOTAL,
        READINESS_WAIT_SECONDS,
        TEST_RESULTS_TOTAL,
        SERVICE_UP,
        BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_stackgate_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("stackgate_"),
                "Metric '{name}' does not start with 'stackgate_' prefix"
            );
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        // 레코더가 없어도 panic하지 않아야 함
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_SERVICE, LABEL_STATUS, LABEL_JOB, LABEL_VERSION] {
            assert_eq!(label.to_lowercase(), label);
        }
    }

    #[test]
    fn readiness_wait_buckets_are_sorted() {
        let buckets = READINESS_WAIT_BUCKETS;
        for i in 1..buckets.len() {
            assert!(
                buckets[i] > buckets[i - 1],
                "Bucket values must be in ascending order"
            );
        }
    }
}
