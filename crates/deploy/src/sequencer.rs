//! 단계적 배포 시퀀서 -- 정리/시작/게이트의 전체 흐름 관리
//!
//! [`PhaseSequencer`]는 [`Plan`]의 phase를 순서대로 실행합니다.
//!
//! # 실행 흐름
//! ```text
//! Plan::build(topology)          ── 순환 의존성 등 설정 오류는 여기서 종료
//!        |
//! pre-run cleanup                ── 관리 대상 컨테이너 제거 (best-effort)
//!        |
//! for phase in plan.phases():
//!     start(바이패스 제외)       ── phase 내부는 동시 실행 (JoinSet)
//!        |
//!     wait_until_ready(...)      ── phase 내부는 동시 실행 (JoinSet)
//!        |
//!     하나라도 실패 → 나머지 phase 중단 (롤백 없음)
//! ```
//!
//! 이미 시작된 phase는 되돌리지 않습니다. 정리는 [`PhaseSequencer::teardown`]
//! 으로 별도 수행합니다.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stackgate_core::gate::{GatePolicy, ReadinessGate, ReadinessOutcome};
use stackgate_core::probe::ProbeClient;
use stackgate_core::topology::{Phase, Plan, ServiceDescriptor, Topology};

use crate::error::DeployError;
use crate::runtime::ContainerRuntime;

/// 배포 최종 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// 모든 phase의 게이트 통과
    Succeeded,
    /// 시작 실패 또는 게이트 실패로 중단
    Failed,
    /// 취소 토큰으로 중단
    Cancelled,
}

/// phase 하나의 실행 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    /// phase 번호
    pub index: usize,
    /// phase에 속한 모든 서비스 (선언 순서)
    pub services: Vec<String>,
    /// 시작을 시도한 서비스
    pub started: Vec<String>,
    /// 바이패스된 서비스 (시작/게이트 모두 생략)
    pub bypassed: Vec<String>,
    /// 시작을 시도한 서비스의 준비 결과 (선언 순서)
    pub outcomes: Vec<ReadinessOutcome>,
}

impl PhaseReport {
    /// 모든 서비스가 준비 완료되었는지 확인합니다.
    pub fn all_ready(&self) -> bool {
        self.outcomes.iter().all(|o| o.succeeded)
    }
}

/// 배포 실행 결과
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentResult {
    /// 최종 상태
    pub status: DeploymentStatus,
    /// 실행된 배포 계획
    pub plan: Plan,
    /// 실행된 phase 보고서 (중단된 phase 포함, 이후 phase 제외)
    pub phases: Vec<PhaseReport>,
    /// 중단된 phase 번호
    pub failed_phase: Option<usize>,
}

impl DeploymentResult {
    /// 배포가 성공했는지 확인합니다.
    pub fn succeeded(&self) -> bool {
        self.status == DeploymentStatus::Succeeded
    }

    /// 모든 준비 결과 (phase 순서)
    pub fn readiness_outcomes(&self) -> Vec<ReadinessOutcome> {
        self.phases
            .iter()
            .flat_map(|p| p.outcomes.iter().cloned())
            .collect()
    }

    /// 준비되지 않은 서비스 이름
    pub fn unready_services(&self) -> Vec<&str> {
        self.phases
            .iter()
            .flat_map(|p| p.outcomes.iter())
            .filter(|o| !o.succeeded)
            .map(|o| o.service.as_str())
            .collect()
    }
}

/// 단계적 배포 시퀀서
///
/// 컨테이너 런타임과 프로브 클라이언트를 `Arc`로 공유하여 phase 내부의
/// 시작/게이트 태스크를 동시에 실행합니다.
///
/// # 사용 예시
/// ```ignore
/// use std::sync::Arc;
/// use stackgate_deploy::{BollardRuntime, PhaseSequencer};
///
/// let sequencer = PhaseSequencer::new(Arc::new(runtime), Arc::new(client))
///     .with_gate_defaults(config.gate_policy())
///     .with_network(&config.deploy.network);
/// let result = sequencer.run_plan(&topology, &cancel).await?;
/// ```
pub struct PhaseSequencer<R: ContainerRuntime, P: ProbeClient> {
    /// 컨테이너 런타임 (공유)
    runtime: Arc<R>,
    /// 준비 게이트
    gate: ReadinessGate<P>,
    /// 서비스별 오버라이드가 없을 때의 게이트 정책
    defaults: GatePolicy,
    /// 기본 네트워크
    network: String,
}

impl<R: ContainerRuntime, P: ProbeClient> PhaseSequencer<R, P> {
    /// 새 시퀀서를 생성합니다.
    pub fn new(runtime: Arc<R>, client: Arc<P>) -> Self {
        Self {
            runtime,
            gate: ReadinessGate::new(client),
            defaults: GatePolicy::default(),
            network: "stackgate".to_owned(),
        }
    }

    /// 기본 게이트 정책을 설정합니다.
    pub fn with_gate_defaults(mut self, defaults: GatePolicy) -> Self {
        self.defaults = defaults;
        self
    }

    /// 기본 네트워크를 설정합니다.
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// 토폴로지를 배포합니다.
    ///
    /// # Errors
    ///
    /// - `DeployError::Config`: 배포 계획을 만들 수 없음 (런타임 호출 없음)
    /// - `DeployError::DockerConnection`: 런타임에 연결할 수 없음
    ///
    /// 시작 실패와 게이트 실패는 에러가 아니라 `DeploymentStatus::Failed`입니다.
    pub async fn run_plan(
        &self,
        topology: &Topology,
        cancel: &CancellationToken,
    ) -> Result<DeploymentResult, DeployError> {
        let plan = Plan::build(topology)?;

        for assumption in plan.bypass_assumptions() {
            warn!(
                service = %assumption.service,
                relied_on_by = ?assumption.relied_on_by,
                "service is bypassed and must already be reachable by its dependents"
            );
        }

        self.runtime.ping().await?;
        self.cleanup(topology).await;

        let mut result = DeploymentResult {
            status: DeploymentStatus::Succeeded,
            plan: plan.clone(),
            phases: Vec::with_capacity(plan.phases().len()),
            failed_phase: None,
        };

        for phase in plan.phases() {
            if cancel.is_cancelled() {
                result.status = DeploymentStatus::Cancelled;
                result.failed_phase = Some(phase.index);
                break;
            }

            let report = self.run_phase(topology, phase, cancel).await;
            let cancelled = report.outcomes.iter().any(|o| o.cancelled);
            let ready = report.all_ready();
            result.phases.push(report);

            if cancelled {
                warn!(phase = phase.index, "deployment cancelled");
                result.status = DeploymentStatus::Cancelled;
                result.failed_phase = Some(phase.index);
                break;
            }
            if !ready {
                warn!(
                    phase = phase.index,
                    remaining = plan.phases().len() - phase.index - 1,
                    "phase failed, aborting remaining phases"
                );
                result.status = DeploymentStatus::Failed;
                result.failed_phase = Some(phase.index);
                break;
            }
        }

        info!(
            status = ?result.status,
            phases_run = result.phases.len(),
            phases_total = plan.phases().len(),
            "deployment finished"
        );
        Ok(result)
    }

    /// 관리 대상 컨테이너(및 선택적으로 데이터 볼륨)를 제거합니다.
    ///
    /// [`teardown`]과 같습니다.
    pub async fn teardown(
        &self,
        topology: &Topology,
        remove_volumes: bool,
    ) -> Result<(), DeployError> {
        teardown(self.runtime.as_ref(), topology, remove_volumes).await
    }

    async fn cleanup(&self, topology: &Topology) {
        for service in topology.services().iter().filter(|s| !s.bypass) {
            if let Err(e) = self.runtime.remove(&service.name).await {
                warn!(service = %service.name, error = %e, "pre-run cleanup failed, continuing");
            }
            if topology.wipe_data_on_start() {
                for volume in &service.data_volumes {
                    if let Err(e) = self.runtime.remove_volume(volume).await {
                        warn!(volume, error = %e, "failed to wipe data volume, continuing");
                    }
                }
            }
        }
        debug!("pre-run cleanup finished");
    }

    async fn run_phase(
        &self,
        topology: &Topology,
        phase: &Phase,
        cancel: &CancellationToken,
    ) -> PhaseReport {
        let services: Vec<&ServiceDescriptor> = phase
            .services
            .iter()
            .filter_map(|name| topology.get(name))
            .collect();
        let (bypassed, to_start): (Vec<&ServiceDescriptor>, Vec<&ServiceDescriptor>) =
            services.iter().copied().partition(|s| s.bypass);

        info!(
            phase = phase.index,
            services = ?phase.services,
            bypassed = bypassed.len(),
            "starting phase"
        );

        // 1. 시작 (동시)
        let mut starts = JoinSet::new();
        for service in &to_start {
            let runtime = Arc::clone(&self.runtime);
            let name = service.name.clone();
            let spec = service.container.clone();
            let network = self.network.clone();
            starts.spawn(async move {
                let result = runtime.start(&name, &spec, &network).await;
                (name, result)
            });
        }

        let mut start_errors: HashMap<String, String> = HashMap::new();
        let mut started: Vec<String> = Vec::new();
        while let Some(joined) = starts.join_next().await {
            match joined {
                Ok((name, Ok(()))) => started.push(name),
                Ok((name, Err(e))) => {
                    warn!(service = %name, error = %e, "service failed to start");
                    start_errors.insert(name, e.to_string());
                }
                Err(e) => warn!(error = %e, "start task failed"),
            }
        }

        // 2. 게이트 (동시)
        let mut gates = JoinSet::new();
        let mut outcomes: HashMap<String, ReadinessOutcome> = HashMap::new();
        for service in &to_start {
            if !started.contains(&service.name) {
                continue;
            }
            let Some(probe) = service.readiness.clone() else {
                debug!(service = %service.name, "no readiness probe, ready once started");
                outcomes.insert(
                    service.name.clone(),
                    ReadinessOutcome::ready_without_probe(&service.name),
                );
                continue;
            };
            let gate = self.gate.clone();
            let name = service.name.clone();
            let policy = self.defaults.with_override(service.gate.as_ref());
            let cancel = cancel.clone();
            gates.spawn(async move { gate.wait_until_ready(&name, &probe, policy, &cancel).await });
        }

        while let Some(joined) = gates.join_next().await {
            match joined {
                Ok(outcome) => {
                    outcomes.insert(outcome.service.clone(), outcome);
                }
                Err(e) => warn!(error = %e, "readiness task failed"),
            }
        }

        // 선언 순서로 정렬, 누락된 결과는 실패로 기록
        let ordered: Vec<ReadinessOutcome> = to_start
            .iter()
            .map(|service| {
                outcomes.remove(&service.name).unwrap_or_else(|| {
                    let reason = start_errors
                        .remove(&service.name)
                        .unwrap_or_else(|| "service task did not complete".to_owned());
                    ReadinessOutcome::not_started(&service.name, reason)
                })
            })
            .collect();

        let started_in_order: Vec<String> = to_start.iter().map(|s| s.name.clone()).collect();

        PhaseReport {
            index: phase.index,
            services: phase.services.clone(),
            started: started_in_order,
            bypassed: bypassed.iter().map(|s| s.name.clone()).collect(),
            outcomes: ordered,
        }
    }
}

/// 관리 대상 컨테이너(및 선택적으로 데이터 볼륨)를 제거합니다.
///
/// 바이패스된 서비스는 건드리지 않습니다. 모든 대상을 시도한 뒤 실패가
/// 있으면 첫 번째 실패를 반환합니다. 이미 없는 대상은 성공으로 취급하므로
/// 반복 호출해도 안전합니다.
pub async fn teardown<R: ContainerRuntime>(
    runtime: &R,
    topology: &Topology,
    remove_volumes: bool,
) -> Result<(), DeployError> {
    let mut first_error = None;

    // 의존 대상보다 의존하는 쪽을 먼저 제거 (선언 역순)
    for service in topology.services().iter().rev().filter(|s| !s.bypass) {
        if let Err(e) = runtime.remove(&service.name).await {
            warn!(service = %service.name, error = %e, "failed to remove container");
            first_error.get_or_insert(e);
            continue;
        }
        info!(service = %service.name, "container removed");

        if remove_volumes {
            for volume in &service.data_volumes {
                if let Err(e) = runtime.remove_volume(volume).await {
                    warn!(volume, error = %e, "failed to remove data volume");
                    first_error.get_or_insert(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
