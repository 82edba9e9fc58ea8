//! 배포 에러 타입
//!
//! [`DeployError`]는 배포 크레이트 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<DeployError> for StackgateError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! 준비 게이트 실패나 컨테이너 시작 실패는 에러가 아닙니다. 둘 다
//! [`DeploymentResult`](crate::sequencer::DeploymentResult)에 기록됩니다.

use stackgate_core::error::{ConfigError, StackgateError};

/// 배포 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// 토폴로지 또는 배포 계획 오류 (런타임 호출 전에 보고됨)
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Docker 소켓 연결 실패
    #[error("docker connection error: {0}")]
    DockerConnection(String),

    /// Docker API 호출 실패
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// 이미지 pull 실패
    #[error("image pull failed for '{image}': {reason}")]
    ImagePull {
        /// 이미지 참조
        image: String,
        /// 실패 사유
        reason: String,
    },

    /// 컨테이너 시작 실패
    #[error("failed to start service '{service}': {reason}")]
    StartFailed {
        /// 서비스 이름
        service: String,
        /// 실패 사유
        reason: String,
    },

    /// 컨테이너 명세 오류 (포트 매핑 등)
    #[error("invalid container spec for '{service}': {reason}")]
    InvalidSpec {
        /// 서비스 이름
        service: String,
        /// 오류 사유
        reason: String,
    },
}

impl From<DeployError> for StackgateError {
    fn from(err: DeployError) -> Self {
        match err {
            DeployError::Config(config) => StackgateError::Config(config),
            other => StackgateError::Runtime(other.to_string()),
        }
    }
}
