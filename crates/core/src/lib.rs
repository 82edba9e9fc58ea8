//! # stackgate-core
//!
//! 단계적 배포 오케스트레이터의 공통 기반 크레이트입니다.
//!
//! - [`config`]: `stackgate.toml` 파싱, 환경변수 오버라이드, 검증
//! - [`probe`]: 단일 헬스 체크 (HTTP, TCP, RPC 헬스, 명령 실행)
//! - [`gate`]: 제한된 재시도 기반의 준비 게이트
//! - [`topology`]: 서비스 의존성 그래프와 phase 계획
//! - [`types`]: 검증 케이스 선언 타입
//! - [`metrics`]: Prometheus 메트릭 이름

pub mod config;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod probe;
pub mod topology;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, ProbeError, StackgateError};

// 설정
pub use config::StackConfig;

// 프로브 / 게이트
pub use gate::{GateOverride, GatePolicy, ReadinessGate, ReadinessOutcome};
pub use probe::{NetworkProbeClient, Probe, ProbeClient, ProbeKind, ProbeOutcome, SuccessPredicate};

// 토폴로지
pub use topology::{ContainerSpec, Phase, Plan, ServiceDescriptor, Topology};

// 도메인 타입
pub use types::{SkipCondition, SkipContext, TestCase, TestStatus};
