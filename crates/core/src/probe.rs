//! 프로브 -- 실행 중인 엔드포인트나 프로세스에 대한 단일 헬스 체크
//!
//! [`Probe`]는 불변 값입니다: 무엇을 확인할지([`ProbeKind`])와 관측 결과를
//! 어떻게 판정할지([`SuccessPredicate`])를 담습니다. [`ProbeClient`]가 이를
//! 한 번 실행하고 [`ProbeOutcome`]을 반환합니다.
//!
//! # 실패 표현
//!
//! | 상황                                    | 결과                                  |
//! |-----------------------------------------|---------------------------------------|
//! | 판정 조건 일치                          | `Ok(outcome)`, `success = true`       |
//! | 2xx 이외 응답, 닫힌 포트, 0이 아닌 종료 | `Ok(outcome)`, `success = false`      |
//! | 연결 거부, 타임아웃, 프로세스 생성 실패 | `Ok(outcome)`, `error = Some(..)`     |
//! | 잘못된 URL / 주소 / argv                | `Err(ProbeError::InvalidTarget)`      |
//!
//! 실패한 경우에도 출력 캡처는 항상 시도합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{ConfigError, ProbeError};

/// 프로브 1회 실행당 보관하는 캡처 출력 상한
pub const MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// 프로브별 타임아웃 오버라이드 상한
const MAX_PROBE_TIMEOUT_MS: u64 = 600_000;

/// NOT_SERVING 응답에 대한 `grpc_health_probe` 종료 코드
const RPC_EXIT_NOT_SERVING: i32 = 4;
/// 연결 실패에 대한 `grpc_health_probe` 종료 코드
const RPC_EXIT_CONNECTION_FAILURE: i32 = 2;

// ─── Probe ───────────────────────────────────────────────────────────

/// 단일 체크 명세
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    /// 확인 대상
    #[serde(flatten)]
    pub kind: ProbeKind,
    /// 판정 조건. `None`이면 종류별 기본값을 사용
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<SuccessPredicate>,
    /// 프로브별 타임아웃 오버라이드 (밀리초)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// 프로브 대상 종류
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeKind {
    /// HTTP 요청. 캡처 출력은 `HTTP <code>\n<body>` 형식
    Http {
        url: String,
        #[serde(default)]
        method: HttpMethod,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
    /// `host:port`로 TCP 연결 후 즉시 종료
    Tcp { address: String },
    /// 표준 gRPC 헬스 체크 호출
    RpcHealth {
        address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        service: Option<String>,
    },
    /// 외부 명령 (argv 형식, 셸 해석 없음)
    Shell { command: Vec<String> },
}

/// HTTP 프로브가 지원하는 메서드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// 타입이 지정된 성공 판정 조건
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuccessPredicate {
    /// HTTP 상태 코드가 `min..=max` 범위
    StatusRange { min: u16, max: u16 },
    /// 캡처 출력에 부분 문자열 포함
    Contains { substring: String },
    /// 프로세스 종료 코드 0
    ExitCodeZero,
    /// RPC 헬스가 SERVING 보고
    Serving,
    /// TCP 연결 성립
    Connected,
}

impl Probe {
    fn new(kind: ProbeKind) -> Self {
        Self {
            kind,
            expect: None,
            timeout_ms: None,
        }
    }

    /// 기본 2xx/3xx 판정을 쓰는 HTTP GET 프로브
    pub fn http_get(url: impl Into<String>) -> Self {
        Self::new(ProbeKind::Http {
            url: url.into(),
            method: HttpMethod::Get,
            body: None,
            headers: BTreeMap::new(),
        })
    }

    /// JSON 본문을 보내는 HTTP POST 프로브
    pub fn http_post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(ProbeKind::Http {
            url: url.into(),
            method: HttpMethod::Post,
            body: Some(body.into()),
            headers: BTreeMap::new(),
        })
    }

    /// TCP 연결 프로브
    pub fn tcp(address: impl Into<String>) -> Self {
        Self::new(ProbeKind::Tcp {
            address: address.into(),
        })
    }

    /// 서버 전체에 대한 gRPC 헬스 체크 프로브
    pub fn rpc_health(address: impl Into<String>) -> Self {
        Self::new(ProbeKind::RpcHealth {
            address: address.into(),
            service: None,
        })
    }

    /// 명령 실행 프로브
    pub fn shell<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ProbeKind::Shell {
            command: command.into_iter().map(Into::into).collect(),
        })
    }

    /// 성공 판정 조건을 교체합니다.
    pub fn with_expect(mut self, predicate: SuccessPredicate) -> Self {
        self.expect = Some(predicate);
        self
    }

    /// 프로브별 타임아웃을 설정합니다.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// 실제로 적용되는 판정 조건 (명시값 또는 종류별 기본값)
    pub fn predicate(&self) -> SuccessPredicate {
        self.expect.clone().unwrap_or_else(|| match self.kind {
            ProbeKind::Http { .. } => SuccessPredicate::StatusRange { min: 200, max: 399 },
            ProbeKind::Tcp { .. } => SuccessPredicate::Connected,
            ProbeKind::RpcHealth { .. } => SuccessPredicate::Serving,
            ProbeKind::Shell { .. } => SuccessPredicate::ExitCodeZero,
        })
    }

    /// 로그와 메트릭용 종류 레이블
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ProbeKind::Http { .. } => "http",
            ProbeKind::Tcp { .. } => "tcp",
            ProbeKind::RpcHealth { .. } => "rpc_health",
            ProbeKind::Shell { .. } => "shell",
        }
    }

    /// 사람이 읽을 수 있는 대상 (URL, 주소, 명령줄)
    pub fn target(&self) -> String {
        match &self.kind {
            ProbeKind::Http { url, method, .. } => format!("{method} {url}"),
            ProbeKind::Tcp { address } => address.clone(),
            ProbeKind::RpcHealth { address, service } => match service {
                Some(service) => format!("{address} ({service})"),
                None => address.clone(),
            },
            ProbeKind::Shell { command } => command.join(" "),
        }
    }

    /// 대상과 판정 조건의 호환성을 검증합니다.
    ///
    /// `context`는 선언 위치입니다 (예: `service 'db' readiness`).
    pub fn validate(&self, context: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidProbe {
            context: context.to_owned(),
            reason,
        };

        match &self.kind {
            ProbeKind::Http { url, headers, .. } => {
                parse_http_url(url).map_err(|e| invalid(e.to_string()))?;
                if headers.keys().any(|k| k.trim().is_empty()) {
                    return Err(invalid("header names must not be empty".to_owned()));
                }
            }
            ProbeKind::Tcp { address } | ProbeKind::RpcHealth { address, .. } => {
                validate_address(address).map_err(|e| invalid(e.to_string()))?;
            }
            ProbeKind::Shell { command } => {
                split_command(command).map_err(|e| invalid(e.to_string()))?;
            }
        }

        if let Some(timeout_ms) = self.timeout_ms
            && (timeout_ms == 0 || timeout_ms > MAX_PROBE_TIMEOUT_MS)
        {
            return Err(invalid(format!(
                "timeout_ms must be 1-{MAX_PROBE_TIMEOUT_MS}"
            )));
        }

        let predicate = self.predicate();
        if !predicate.applies_to(&self.kind) {
            return Err(invalid(format!(
                "predicate '{}' cannot be used with a {} probe",
                predicate.name(),
                self.kind_name()
            )));
        }
        if let SuccessPredicate::StatusRange { min, max } = predicate
            && min > max
        {
            return Err(invalid(format!("status range {min}-{max} is empty")));
        }

        Ok(())
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

impl SuccessPredicate {
    /// 에러 메시지에 쓰는 고정 이름
    pub fn name(&self) -> &'static str {
        match self {
            Self::StatusRange { .. } => "status_range",
            Self::Contains { .. } => "contains",
            Self::ExitCodeZero => "exit_code_zero",
            Self::Serving => "serving",
            Self::Connected => "connected",
        }
    }

    /// 주어진 종류에 대해 평가 가능한 조건인지 확인합니다.
    pub fn applies_to(&self, kind: &ProbeKind) -> bool {
        match self {
            Self::StatusRange { .. } => matches!(kind, ProbeKind::Http { .. }),
            Self::Contains { .. } => !matches!(kind, ProbeKind::Tcp { .. }),
            Self::ExitCodeZero => matches!(kind, ProbeKind::Shell { .. } | ProbeKind::RpcHealth { .. }),
            Self::Serving => matches!(kind, ProbeKind::RpcHealth { .. }),
            Self::Connected => matches!(kind, ProbeKind::Tcp { .. }),
        }
    }

    /// 프로브 관측 결과에 조건을 적용합니다.
    pub fn matches(&self, observation: &Observation) -> bool {
        match self {
            Self::StatusRange { min, max } => observation
                .status_code
                .is_some_and(|code| (*min..=*max).contains(&code)),
            Self::Contains { substring } => observation.output.contains(substring.as_str()),
            Self::ExitCodeZero => observation.exit_code == Some(0),
            Self::Serving => observation.serving == Some(ServingStatus::Serving),
            Self::Connected => observation.connected,
        }
    }
}

// ─── Observation / Outcome ───────────────────────────────────────────

/// 표준 헬스 체크 호출의 3상태 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Serving,
    NotServing,
    Unknown,
}

impl fmt::Display for ServingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serving => write!(f, "SERVING"),
            Self::NotServing => write!(f, "NOT_SERVING"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// 프로브 1회 실행으로 수집한 관측값
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    pub status_code: Option<u16>,
    pub exit_code: Option<i32>,
    pub serving: Option<ServingStatus>,
    pub connected: bool,
    pub output: String,
}

/// 프로브 1회 실행의 판정 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// 성공 판정 조건 일치 여부
    pub success: bool,
    /// 캡처 출력 ([`MAX_CAPTURE_BYTES`]로 잘릴 수 있음)
    pub output: String,
    /// 대상에 도달하지 못한 경우의 전송 실패 설명
    pub error: Option<String>,
}

impl ProbeOutcome {
    /// 주어진 조건으로 관측값을 판정합니다.
    pub fn judge(predicate: &SuccessPredicate, observation: Observation) -> Self {
        let success = predicate.matches(&observation);
        Self {
            success,
            output: truncate_capture(observation.output),
            error: None,
        }
    }

    /// 대상 도달 불가 (연결 거부, 타임아웃, 프로세스 생성 실패)
    pub fn transport_error(error: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: truncate_capture(output.into()),
            error: Some(error.into()),
        }
    }
}

// ─── ProbeClient ─────────────────────────────────────────────────────

/// 프로브 실행기
///
/// 구현체는 재시도하지 않습니다. 재시도는
/// [`ReadinessGate`](crate::gate::ReadinessGate)가 담당합니다.
pub trait ProbeClient: Send + Sync + 'static {
    /// 프로브를 정확히 한 번 실행합니다.
    ///
    /// # Errors
    ///
    /// 프로브 자체가 잘못된 경우에만 `ProbeError::InvalidTarget`을
    /// 반환합니다. 도달 불가 대상은 [`ProbeOutcome::error`]로 보고됩니다.
    fn execute(
        &self,
        probe: &Probe,
    ) -> impl Future<Output = Result<ProbeOutcome, ProbeError>> + Send;
}

/// 실제 프로브 클라이언트 (HTTP는 reqwest, TCP와 명령은 tokio)
pub struct NetworkProbeClient {
    http: reqwest::Client,
    timeout: Duration,
    rpc_health_command: Vec<String>,
}

impl NetworkProbeClient {
    /// 자체 오버라이드가 없는 모든 프로브에 `timeout`을 적용하는 클라이언트를
    /// 생성합니다. `rpc_health_command`는 RPC 헬스 체크에 쓰는 argv 접두사입니다
    /// (예: `["grpc_health_probe"]`).
    ///
    /// # Errors
    ///
    /// HTTP 클라이언트를 만들 수 없으면 `ProbeError::ClientInit`을 반환합니다.
    pub fn new(timeout: Duration, rpc_health_command: Vec<String>) -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::ClientInit(e.to_string()))?;
        Ok(Self {
            http,
            timeout,
            rpc_health_command,
        })
    }

    fn effective_timeout(&self, probe: &Probe) -> Duration {
        probe
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.timeout)
    }

    async fn execute_http(
        &self,
        probe: &Probe,
        url: &str,
        method: HttpMethod,
        body: Option<&str>,
        headers: &BTreeMap<String, String>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let parsed = parse_http_url(url)?;
        let mut request = match method {
            HttpMethod::Get => self.http.get(parsed),
            HttpMethod::Post => self.http.post(parsed),
        }
        .timeout(self.effective_timeout(probe));

        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            let has_content_type = headers
                .keys()
                .any(|k| k.eq_ignore_ascii_case("content-type"));
            if !has_content_type {
                request = request.header(reqwest::header::CONTENT_TYPE, "application/json");
            }
            request = request.body(body.to_owned());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_builder() => {
                return Err(ProbeError::InvalidTarget {
                    target: url.to_owned(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                let reason = if e.is_timeout() {
                    "request timed out".to_owned()
                } else if e.is_connect() {
                    format!("connection failed: {e}")
                } else {
                    e.to_string()
                };
                debug!(url, error = %reason, "http probe transport failure");
                return Ok(ProbeOutcome::transport_error(reason, String::new()));
            }
        };

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<unreadable body: {e}>"));

        Ok(ProbeOutcome::judge(
            &probe.predicate(),
            Observation {
                status_code: Some(status),
                output: format!("HTTP {status}\n{body}"),
                ..Observation::default()
            },
        ))
    }

    async fn execute_tcp(&self, probe: &Probe, address: &str) -> Result<ProbeOutcome, ProbeError> {
        validate_address(address)?;
        let timeout = self.effective_timeout(probe);

        match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                Ok(ProbeOutcome::judge(
                    &probe.predicate(),
                    Observation {
                        connected: true,
                        output: format!("connected to {address}"),
                        ..Observation::default()
                    },
                ))
            }
            Ok(Err(e)) => Ok(ProbeOutcome::transport_error(
                format!("connection to {address} failed: {e}"),
                String::new(),
            )),
            Err(_elapsed) => Ok(ProbeOutcome::transport_error(
                format!("connection to {address} timed out after {}ms", timeout.as_millis()),
                String::new(),
            )),
        }
    }

    async fn execute_rpc_health(
        &self,
        probe: &Probe,
        address: &str,
        service: Option<&str>,
    ) -> Result<ProbeOutcome, ProbeError> {
        validate_address(address)?;
        let timeout = self.effective_timeout(probe);
        let timeout_arg = format!("{}ms", timeout.as_millis());

        let mut argv = self.rpc_health_command.clone();
        argv.push(format!("-addr={address}"));
        argv.push(format!("-connect-timeout={timeout_arg}"));
        argv.push(format!("-rpc-timeout={timeout_arg}"));
        if let Some(service) = service {
            argv.push(format!("-service={service}"));
        }

        let output = match run_command(&argv, timeout).await? {
            CommandRun::Completed { exit_code, output } => (exit_code, output),
            CommandRun::Failed(reason) => {
                return Ok(ProbeOutcome::transport_error(reason, String::new()));
            }
        };

        let (exit_code, captured) = output;
        if exit_code == Some(RPC_EXIT_CONNECTION_FAILURE) {
            return Ok(ProbeOutcome::transport_error(
                format!("rpc health connection to {address} failed"),
                captured,
            ));
        }

        let serving = match exit_code {
            Some(0) => ServingStatus::Serving,
            Some(RPC_EXIT_NOT_SERVING) => ServingStatus::NotServing,
            _ => ServingStatus::Unknown,
        };

        Ok(ProbeOutcome::judge(
            &probe.predicate(),
            Observation {
                exit_code,
                serving: Some(serving),
                output: format!("status: {serving}\n{captured}"),
                ..Observation::default()
            },
        ))
    }

    async fn execute_shell(
        &self,
        probe: &Probe,
        command: &[String],
    ) -> Result<ProbeOutcome, ProbeError> {
        match run_command(command, self.effective_timeout(probe)).await? {
            CommandRun::Completed { exit_code, output } => Ok(ProbeOutcome::judge(
                &probe.predicate(),
                Observation {
                    exit_code,
                    output,
                    ..Observation::default()
                },
            )),
            CommandRun::Failed(reason) => Ok(ProbeOutcome::transport_error(reason, String::new())),
        }
    }
}

impl ProbeClient for NetworkProbeClient {
    async fn execute(&self, probe: &Probe) -> Result<ProbeOutcome, ProbeError> {
        match &probe.kind {
            ProbeKind::Http {
                url,
                method,
                body,
                headers,
            } => {
                self.execute_http(probe, url, *method, body.as_deref(), headers)
                    .await
            }
            ProbeKind::Tcp { address } => self.execute_tcp(probe, address).await,
            ProbeKind::RpcHealth { address, service } => {
                self.execute_rpc_health(probe, address, service.as_deref())
                    .await
            }
            ProbeKind::Shell { command } => self.execute_shell(probe, command).await,
        }
    }
}

// ─── 헬퍼 ─────────────────────────────────────────────────────────

enum CommandRun {
    Completed {
        exit_code: Option<i32>,
        output: String,
    },
    Failed(String),
}

async fn run_command(argv: &[String], timeout: Duration) -> Result<CommandRun, ProbeError> {
    let (program, args) = split_command(argv)?;

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => {
            let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
            captured.push_str(&String::from_utf8_lossy(&output.stderr));
            Ok(CommandRun::Completed {
                exit_code: output.status.code(),
                output: captured,
            })
        }
        Ok(Err(e)) => Ok(CommandRun::Failed(format!("failed to run '{program}': {e}"))),
        Err(_elapsed) => Ok(CommandRun::Failed(format!(
            "'{program}' timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

fn split_command(argv: &[String]) -> Result<(&str, &[String]), ProbeError> {
    match argv.split_first() {
        Some((program, args)) if !program.trim().is_empty() => Ok((program.as_str(), args)),
        _ => Err(ProbeError::InvalidTarget {
            target: argv.join(" "),
            reason: "command must start with a non-empty program".to_owned(),
        }),
    }
}

fn parse_http_url(url: &str) -> Result<reqwest::Url, ProbeError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| ProbeError::InvalidTarget {
        target: url.to_owned(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ProbeError::InvalidTarget {
            target: url.to_owned(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// 주소가 0이 아닌 포트를 가진 `host:port` 형식인지 확인합니다.
pub fn validate_address(address: &str) -> Result<(), ProbeError> {
    let invalid = |reason: &str| ProbeError::InvalidTarget {
        target: address.to_owned(),
        reason: reason.to_owned(),
    };

    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| invalid("expected host:port"))?;
    if host.is_empty() {
        return Err(invalid("host must not be empty"));
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(invalid("port must be 1-65535")),
        Ok(_) => Ok(()),
    }
}

fn truncate_capture(mut output: String) -> String {
    if output.len() > MAX_CAPTURE_BYTES {
        let mut cut = MAX_CAPTURE_BYTES;
        while !output.is_char_boundary(cut) {
            cut -= 1;
        }
        output.truncate(cut);
        output.push_str("\n<output truncated>");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_predicates_follow_kind() {
        assert_eq!(
            Probe::http_get("http://localhost:8000/livez").predicate(),
            SuccessPredicate::StatusRange { min: 200, max: 399 }
        );
        assert_eq!(Probe::tcp("db:5432").predicate(), SuccessPredicate::Connected);
        assert_eq!(
            Probe::rpc_health("engine:50051").predicate(),
            SuccessPredicate::Serving
        );
        assert_eq!(
            Probe::shell(["true"]).predicate(),
            SuccessPredicate::ExitCodeZero
        );
    }

    #[test]
    fn validate_accepts_well_formed_probes() {
        Probe::http_get("http://localhost:8000/api/health")
            .validate("test")
            .unwrap();
        Probe::tcp("localhost:9092").validate("test").unwrap();
        Probe::rpc_health("[::1]:50051").validate("test").unwrap();
        Probe::shell(["docker", "exec", "db", "pg_isready"])
            .validate("test")
            .unwrap();
    }

    #[test]
    fn validate_rejects_malformed_url() {
        let err = Probe::http_get("localhost:8000/health")
            .validate("service 'api' readiness")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProbe { .. }));
        assert!(err.to_string().contains("service 'api' readiness"));
    }

    #[test]
    fn validate_rejects_non_http_scheme() {
        let err = Probe::http_get("ftp://files.local/x").validate("t").unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn validate_rejects_address_without_port() {
        assert!(Probe::tcp("localhost").validate("t").is_err());
        assert!(Probe::tcp("localhost:0").validate("t").is_err());
        assert!(Probe::tcp(":5432").validate("t").is_err());
        assert!(Probe::tcp("localhost:99999").validate("t").is_err());
    }

    #[test]
    fn validate_rejects_empty_command() {
        assert!(Probe::shell(Vec::<String>::new()).validate("t").is_err());
        assert!(Probe::shell([" "]).validate("t").is_err());
    }

    #[test]
    fn validate_rejects_incompatible_predicate() {
        let err = Probe::tcp("db:5432")
            .with_expect(SuccessPredicate::StatusRange { min: 200, max: 299 })
            .validate("t")
            .unwrap_err();
        assert!(err.to_string().contains("status_range"));

        assert!(
            Probe::http_get("http://x:1/")
                .with_expect(SuccessPredicate::Serving)
                .validate("t")
                .is_err()
        );
    }

    #[test]
    fn validate_rejects_empty_status_range() {
        let err = Probe::http_get("http://x:1/")
            .with_expect(SuccessPredicate::StatusRange { min: 500, max: 200 })
            .validate("t")
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn validate_rejects_zero_timeout_override() {
        let mut probe = Probe::tcp("db:5432");
        probe.timeout_ms = Some(0);
        assert!(probe.validate("t").is_err());
    }

    #[test]
    fn status_range_predicate_matches_inclusive_bounds() {
        let predicate = SuccessPredicate::StatusRange { min: 200, max: 399 };
        let observe = |code| Observation {
            status_code: Some(code),
            ..Observation::default()
        };
        assert!(predicate.matches(&observe(200)));
        assert!(predicate.matches(&observe(399)));
        assert!(!predicate.matches(&observe(404)));
        assert!(!predicate.matches(&Observation::default()));
    }

    #[test]
    fn serving_predicate_rejects_not_serving_and_unknown() {
        let observe = |s| Observation {
            serving: Some(s),
            ..Observation::default()
        };
        assert!(SuccessPredicate::Serving.matches(&observe(ServingStatus::Serving)));
        assert!(!SuccessPredicate::Serving.matches(&observe(ServingStatus::NotServing)));
        assert!(!SuccessPredicate::Serving.matches(&observe(ServingStatus::Unknown)));
    }

    #[test]
    fn contains_predicate_matches_captured_output() {
        let predicate = SuccessPredicate::Contains {
            substring: "\"allowed\":true".to_owned(),
        };
        let observation = Observation {
            output: "HTTP 200\n{\"allowed\":true}".to_owned(),
            ..Observation::default()
        };
        assert!(predicate.matches(&observation));
    }

    #[test]
    fn truncate_capture_keeps_char_boundary() {
        let long = "é".repeat(MAX_CAPTURE_BYTES);
        let truncated = truncate_capture(long);
        assert!(truncated.ends_with("<output truncated>"));
        assert!(truncated.len() <= MAX_CAPTURE_BYTES + 20);
    }

    #[test]
    fn probe_deserializes_from_toml() {
        let probe: Probe = toml::from_str(
            r#"
kind = "http"
url = "http://relations-api:8000/api/authz/v1beta1/tuples"
method = "POST"
body = '{"tuples":[]}'
expect = { type = "status_range", min = 200, max = 299 }
"#,
        )
        .unwrap();
        assert_eq!(probe.kind_name(), "http");
        assert_eq!(
            probe.predicate(),
            SuccessPredicate::StatusRange { min: 200, max: 299 }
        );
        match probe.kind {
            ProbeKind::Http { method, body, .. } => {
                assert_eq!(method, HttpMethod::Post);
                assert_eq!(body.as_deref(), Some("{\"tuples\":[]}"));
            }
            other => panic!("expected http probe, got {other:?}"),
        }
    }

    #[test]
    fn shell_probe_deserializes_from_toml() {
        let probe: Probe = toml::from_str(
            r#"
kind = "shell"
command = ["docker", "exec", "spicedb", "zed", "schema", "read"]
timeout_ms = 15000
"#,
        )
        .unwrap();
        assert_eq!(probe.target(), "docker exec spicedb zed schema read");
        assert_eq!(probe.timeout_ms, Some(15_000));
    }
}
