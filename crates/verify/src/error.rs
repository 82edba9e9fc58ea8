//! 검증 에러 타입
//!
//! 케이스 실패는 에러가 아니라 [`TestStatus::Fail`](stackgate_core::types::TestStatus)
//! 결과로 기록됩니다. 여기의 에러는 보고서를 남길 수 없는 경우에만 발생하며
//! 프로세스 수준의 실패로 전파됩니다.

use stackgate_core::error::StackgateError;

/// 검증 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// 아티팩트/보고서 파일 쓰기 실패
    #[error("failed to write report artifact '{path}': {source}")]
    Io {
        /// 대상 경로
        path: String,
        /// 원인
        #[source]
        source: std::io::Error,
    },

    /// 요약 직렬화 실패
    #[error("failed to serialize summary: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<VerifyError> for StackgateError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Io { path, source } => StackgateError::Io(std::io::Error::new(
                source.kind(),
                format!("{path}: {source}"),
            )),
            other => StackgateError::Report(other.to_string()),
        }
    }
}
