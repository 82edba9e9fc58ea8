//! 에러 타입 -- 모든 stackgate 크레이트가 공유하는 에러 계층
//!
//! 설정 오류는 치명적이며 어떤 서비스도 건드리기 전에 보고됩니다.
//! 예상 가능한 프로브 실패(2xx 이외 응답, 연결 거부, 0이 아닌 종료 코드)는
//! 에러가 아니라 [`ProbeOutcome`](crate::probe::ProbeOutcome)에 기록됩니다.

/// stackgate 최상위 에러
#[derive(Debug, thiserror::Error)]
pub enum StackgateError {
    /// 잘못되었거나 읽을 수 없는 설정
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 실행 시점에 발견된 프로브 설정 오류
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),

    /// deploy 크레이트가 전달한 컨테이너 런타임 실패
    #[error("runtime error: {0}")]
    Runtime(String),

    /// 보고서/아티팩트 생성 실패
    #[error("report error: {0}")]
    Report(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StackgateError {
    /// 관리 대상 스택이 아니라 오케스트레이터 자체 설정에서 비롯된
    /// 에러인지 확인합니다.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Probe(ProbeError::InvalidTarget { .. }))
    }
}

/// 설정 에러 (모두 치명적이며 재시도 불가)
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// TOML 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 범위를 벗어나거나 알 수 없는 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// 서비스 이름 중복
    #[error("duplicate service name: {name}")]
    DuplicateService { name: String },

    /// 선언되지 않은 서비스에 대한 의존
    #[error("service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency { service: String, dependency: String },

    /// `depends_on` 그래프에 순환 존재
    #[error("dependency cycle detected: {}", cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    /// 잘못된 프로브 선언
    #[error("invalid probe for {context}: {reason}")]
    InvalidProbe { context: String, reason: String },

    /// 바이패스 대상이 선언되지 않은 서비스
    #[error("unknown service: {name}")]
    UnknownService { name: String },

    /// 테스트 케이스 이름 중복
    #[error("duplicate test case name: {name}")]
    DuplicateTestCase { name: String },
}

/// 프로브 에러
///
/// 설정 오류만 에러로 취급합니다. 전송 실패는 실패한
/// [`ProbeOutcome`](crate::probe::ProbeOutcome)으로 기록됩니다.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// 사용할 수 없는 대상 (잘못된 URL, 주소, 명령)
    #[error("invalid probe target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// HTTP 클라이언트 생성 실패
    #[error("probe client init failed: {0}")]
    ClientInit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_cycle_display_names_every_service() {
        let err = ConfigError::DependencyCycle {
            cycle: vec!["api".to_owned(), "engine".to_owned(), "api".to_owned()],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle detected: api -> engine -> api"
        );
    }

    #[test]
    fn config_errors_are_classified_as_config() {
        let err: StackgateError = ConfigError::DuplicateService {
            name: "db".to_owned(),
        }
        .into();
        assert!(err.is_config());
    }

    #[test]
    fn invalid_probe_target_is_classified_as_config() {
        let err: StackgateError = ProbeError::InvalidTarget {
            target: "http//nope".to_owned(),
            reason: "relative URL without a base".to_owned(),
        }
        .into();
        assert!(err.is_config());
        assert!(err.to_string().contains("http//nope"));
    }

    #[test]
    fn runtime_error_is_not_config() {
        let err = StackgateError::Runtime("docker daemon unreachable".to_owned());
        assert!(!err.is_config());
    }
}
