//! 설정 관리 — stackgate.toml 파싱 및 런타임 설정
//!
//! [`StackConfig`]는 배포 토폴로지, 게이트 정책, 검증 스위트를 포함한
//! 최상위 설정 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`STACKGATE_GATE_MAX_ATTEMPTS=60` 형식)
//! 3. 설정 파일 (`stackgate.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), stackgate_core::error::StackgateError> {
//! use stackgate_core::config::StackConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = StackConfig::load("stackgate.toml").await?;
//! let topology = config.topology()?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = StackConfig::parse("[gate]\nmax_attempts = 60")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, StackgateError};
use crate::gate::GatePolicy;
use crate::topology::{Plan, ServiceDescriptor, Topology};
use crate::types::{TestCase, validate_test_cases};

const MAX_INTERVAL_MS: u64 = 60_000;
const MAX_ATTEMPTS: u32 = 1_000;
const MAX_PROBE_TIMEOUT_MS: u64 = 60_000;

/// Stackgate 통합 설정
///
/// `stackgate.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 준비 게이트 기본 정책
    #[serde(default)]
    pub gate: GateConfig,
    /// 배포 설정
    #[serde(default)]
    pub deploy: DeployConfig,
    /// 검증 스위트 설정
    #[serde(default)]
    pub verify: VerifyConfig,
    /// 프로브 클라이언트 설정
    #[serde(default)]
    pub probe: ProbeConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// 관리 대상 서비스 (선언 순서 유지)
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
    /// 검증 케이스 (실행 순서)
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

impl StackConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StackgateError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, StackgateError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StackgateError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                StackgateError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, StackgateError> {
        toml::from_str(toml_str).map_err(|e| {
            StackgateError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `STACKGATE_{SECTION}_{FIELD}`
    /// 예: `STACKGATE_DEPLOY_BYPASS=spicedb,kafka`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "STACKGATE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "STACKGATE_GENERAL_LOG_FORMAT");

        // Gate
        override_u64(&mut self.gate.interval_ms, "STACKGATE_GATE_INTERVAL_MS");
        override_u32(&mut self.gate.max_attempts, "STACKGATE_GATE_MAX_ATTEMPTS");
        override_u64(
            &mut self.gate.probe_timeout_ms,
            "STACKGATE_GATE_PROBE_TIMEOUT_MS",
        );

        // Deploy
        override_bool(
            &mut self.deploy.wipe_data_on_start,
            "STACKGATE_DEPLOY_WIPE_DATA_ON_START",
        );
        override_string(&mut self.deploy.network, "STACKGATE_DEPLOY_NETWORK");
        override_string(
            &mut self.deploy.docker_socket,
            "STACKGATE_DEPLOY_DOCKER_SOCKET",
        );
        override_csv(&mut self.deploy.bypass, "STACKGATE_DEPLOY_BYPASS");

        // Verify
        override_string(&mut self.verify.output_dir, "STACKGATE_VERIFY_OUTPUT_DIR");
        override_bool(
            &mut self.verify.write_artifacts,
            "STACKGATE_VERIFY_WRITE_ARTIFACTS",
        );
        override_bool(
            &mut self.verify.run_after_deploy,
            "STACKGATE_VERIFY_RUN_AFTER_DEPLOY",
        );

        // Probe
        override_args(
            &mut self.probe.rpc_health_command,
            "STACKGATE_PROBE_RPC_HEALTH_COMMAND",
        );

        // Metrics
        override_string(
            &mut self.metrics.listen_addr,
            "STACKGATE_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "STACKGATE_METRICS_PORT");
        override_u64(
            &mut self.metrics.scrape_interval_secs,
            "STACKGATE_METRICS_SCRAPE_INTERVAL_SECS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 순환 의존성 검출을 포함하므로, 검증을 통과한 설정은 항상 배포
    /// 계획을 만들 수 있습니다.
    pub fn validate(&self) -> Result<(), StackgateError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        // 게이트 정책 범위 검증
        validate_gate_bounds("gate", Some(self.gate.interval_ms), Some(self.gate.max_attempts))?;
        if self.gate.probe_timeout_ms == 0 || self.gate.probe_timeout_ms > MAX_PROBE_TIMEOUT_MS {
            return Err(invalid(
                "gate.probe_timeout_ms",
                format!("must be 1-{MAX_PROBE_TIMEOUT_MS}"),
            ));
        }
        for service in &self.services {
            if let Some(over) = &service.gate {
                validate_gate_bounds(
                    &format!("services.{}.gate", service.name),
                    over.interval_ms,
                    over.max_attempts,
                )?;
            }
        }

        if self.deploy.network.trim().is_empty() {
            return Err(invalid("deploy.network", "must not be empty".to_owned()));
        }
        if self.verify.output_dir.trim().is_empty() {
            return Err(invalid("verify.output_dir", "must not be empty".to_owned()));
        }
        if self
            .probe
            .rpc_health_command
            .first()
            .is_none_or(|program| program.trim().is_empty())
        {
            return Err(invalid(
                "probe.rpc_health_command",
                "must start with a program name".to_owned(),
            ));
        }
        if self.metrics.scrape_interval_secs == 0 {
            return Err(invalid(
                "metrics.scrape_interval_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        // 토폴로지 + 배포 계획 (중복, 미지의 의존 대상, 순환 의존성, 바이패스 대상)
        let topology = self.topology()?;
        Plan::build(&topology)?;

        validate_test_cases(&self.tests)?;

        Ok(())
    }

    /// 서비스 선언과 `[deploy]` 설정으로 토폴로지를 구성합니다.
    pub fn topology(&self) -> Result<Topology, ConfigError> {
        Ok(Topology::new(self.services.clone())?
            .with_bypassed(&self.deploy.bypass)?
            .with_wipe_data_on_start(self.deploy.wipe_data_on_start))
    }

    /// `[gate]` 섹션의 기본 게이트 정책
    pub fn gate_policy(&self) -> GatePolicy {
        GatePolicy::new(
            Duration::from_millis(self.gate.interval_ms),
            self.gate.max_attempts,
        )
    }

    /// 서비스별 오버라이드를 병합한 게이트 정책
    pub fn gate_policy_for(&self, service: &ServiceDescriptor) -> GatePolicy {
        self.gate_policy().with_override(service.gate.as_ref())
    }

    /// 프로브 1회 실행의 기본 타임아웃
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.gate.probe_timeout_ms)
    }
}

fn invalid(field: &str, reason: String) -> StackgateError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

fn validate_gate_bounds(
    section: &str,
    interval_ms: Option<u64>,
    max_attempts: Option<u32>,
) -> Result<(), StackgateError> {
    if let Some(interval_ms) = interval_ms
        && (interval_ms == 0 || interval_ms > MAX_INTERVAL_MS)
    {
        return Err(invalid(
            &format!("{section}.interval_ms"),
            format!("must be 1-{MAX_INTERVAL_MS}"),
        ));
    }
    if let Some(max_attempts) = max_attempts
        && (max_attempts == 0 || max_attempts > MAX_ATTEMPTS)
    {
        return Err(invalid(
            &format!("{section}.max_attempts"),
            format!("must be 1-{MAX_ATTEMPTS}"),
        ));
    }
    Ok(())
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 준비 게이트 기본 정책
///
/// 기본값의 최악 대기 시간은 서비스당 `30 × 5s + 29 × 2s = 208s`입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// 시도 간격 (밀리초)
    pub interval_ms: u64,
    /// 최대 시도 횟수
    pub max_attempts: u32,
    /// 프로브 1회 타임아웃 (밀리초)
    pub probe_timeout_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            max_attempts: 30,
            probe_timeout_ms: 5_000,
        }
    }
}

/// 배포 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// 시작 전 선언된 데이터 볼륨 삭제
    pub wipe_data_on_start: bool,
    /// 관리 대상 컨테이너가 연결될 기본 네트워크
    pub network: String,
    /// Docker 소켓 경로 (비어 있으면 플랫폼 기본값)
    pub docker_socket: String,
    /// 외부에서 실행 중인 것으로 간주할 서비스 이름
    pub bypass: Vec<String>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            wipe_data_on_start: false,
            network: "stackgate".to_owned(),
            docker_socket: String::new(),
            bypass: Vec::new(),
        }
    }
}

/// 검증 스위트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// 보고서 출력 디렉토리
    pub output_dir: String,
    /// 케이스별 출력 파일 저장 여부
    pub write_artifacts: bool,
    /// 배포 성공 후 자동으로 스위트 실행
    pub run_after_deploy: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            output_dir: "test-results".to_owned(),
            write_artifacts: true,
            run_after_deploy: true,
        }
    }
}

/// 프로브 클라이언트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// RPC 헬스 체크에 사용할 외부 도구 (argv 접두어)
    pub rpc_health_command: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            rpc_health_command: vec!["grpc_health_probe".to_owned()],
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 익스포터 바인드 주소
    pub listen_addr: String,
    /// 익스포터 포트
    pub port: u16,
    /// 서비스 상태 수집 주기 (초)
    pub scrape_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1".to_owned(),
            port: 9091,
            scrape_interval_secs: 15,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

/// 공백으로 구분된 argv 오버라이드 (셸 인용 규칙 없음)
fn override_args(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val.split_whitespace().map(str::to_owned).collect();
    }
}
