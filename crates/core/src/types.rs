//! 도메인 타입 -- 검증 스위트 선언에 사용되는 공통 타입
//!
//! 설정 파일의 `[[tests]]` 항목이 [`TestCase`]로 역직렬화되며,
//! 실행은 `stackgate-verify` 크레이트가 담당합니다.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::probe::Probe;

/// 검증 케이스 선언
///
/// 스위트 안에서 선언 순서대로 실행됩니다. 앞선 케이스의 부수 효과에
/// 의존하는 케이스(생성 후 조회 등)는 같은 카테고리 안에 인접하게 둡니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// 고유 케이스 이름
    pub name: String,
    /// 보고서 분류용 카테고리 (예: `relations`, `kessel`)
    #[serde(default = "default_category")]
    pub category: String,
    /// 실행할 프로브
    pub probe: Probe,
    /// 캡처된 출력에 포함되어야 하는 문자열
    ///
    /// 설정되어 있으면 프로브 판정 대신 부분 문자열 일치로 Pass를 결정합니다.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<String>,
    /// 실행 전에 평가하는 스킵 조건
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_if: Option<SkipCondition>,
}

fn default_category() -> String {
    "general".to_owned()
}

impl TestCase {
    /// 새 케이스를 생성합니다.
    pub fn new(name: impl Into<String>, category: impl Into<String>, probe: Probe) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            probe,
            expect: None,
            skip_if: None,
        }
    }

    /// 기대 문자열을 설정합니다.
    pub fn expecting(mut self, substring: impl Into<String>) -> Self {
        self.expect = Some(substring.into());
        self
    }

    /// 스킵 조건을 설정합니다.
    pub fn skip_if(mut self, condition: SkipCondition) -> Self {
        self.skip_if = Some(condition);
        self
    }

    /// 케이스 선언을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "tests.name".to_owned(),
                reason: "test case name must not be empty".to_owned(),
            });
        }
        self.probe.validate(&format!("test '{}'", self.name))?;
        if let Some(SkipCondition::ProbeFails { probe }) = &self.skip_if {
            probe.validate(&format!("test '{}' skip condition", self.name))?;
        }
        Ok(())
    }
}

/// 케이스 목록 전체를 검증합니다 (이름 중복 포함).
pub fn validate_test_cases(cases: &[TestCase]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for case in cases {
        case.validate()?;
        if !seen.insert(case.name.as_str()) {
            return Err(ConfigError::DuplicateTestCase {
                name: case.name.clone(),
            });
        }
    }
    Ok(())
}

/// 케이스 실행 전에 평가하는 스킵 조건
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum SkipCondition {
    /// 환경 변수가 설정되지 않았으면 스킵
    EnvUnset { var: String },
    /// 환경 변수가 설정되어 있으면 스킵
    EnvSet { var: String },
    /// 서비스가 바이패스되었으면 스킵
    ServiceBypassed { service: String },
    /// 사전 확인 프로브가 실패하면 스킵 (예: 권한 스키마 미적용)
    ProbeFails { probe: Probe },
    /// 항상 스킵
    Always { reason: String },
}

impl SkipCondition {
    /// 프로브 실행 없이 판정 가능한 조건을 평가합니다.
    ///
    /// 스킵해야 하면 사유를 반환합니다. [`SkipCondition::ProbeFails`]는
    /// 프로브 클라이언트가 필요하므로 여기서는 항상 `None`입니다.
    pub fn evaluate_static(&self, context: &SkipContext) -> Option<String> {
        match self {
            Self::EnvUnset { var } => match std::env::var(var) {
                Ok(value) if !value.is_empty() => None,
                _ => Some(format!("environment variable {var} is not set")),
            },
            Self::EnvSet { var } => std::env::var(var)
                .ok()
                .filter(|v| !v.is_empty())
                .map(|_| format!("environment variable {var} is set")),
            Self::ServiceBypassed { service } => context
                .is_bypassed(service)
                .then(|| format!("service {service} is bypassed")),
            Self::ProbeFails { .. } => None,
            Self::Always { reason } => Some(reason.clone()),
        }
    }
}

/// 스킵 조건 평가에 필요한 실행 컨텍스트
#[derive(Debug, Clone, Default)]
pub struct SkipContext {
    bypassed: HashSet<String>,
}

impl SkipContext {
    /// 바이패스된 서비스 목록으로 컨텍스트를 생성합니다.
    pub fn new<I, S>(bypassed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bypassed: bypassed.into_iter().map(Into::into).collect(),
        }
    }

    /// 서비스가 바이패스되었는지 확인합니다.
    pub fn is_bypassed(&self, service: &str) -> bool {
        self.bypassed.contains(service)
    }
}

/// 케이스 판정 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
}

impl TestStatus {
    /// 메트릭 레이블 및 보고서용 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
            Self::Skip => write!(f, "SKIP"),
        }
    }
}
