//! 배포 토폴로지 -- 서비스 의존성 그래프와 phase 계획
//!
//! [`Topology`]는 검증된 서비스 집합입니다. [`Plan::build`]는 의존성
//! 그래프를 phase 목록으로 계층화합니다.
//!
//! # Phase 규칙
//! - 의존성이 없는 서비스는 phase 0
//! - 그 외의 서비스는 `max(의존 대상의 phase) + 1` (최장 경로 계층화)
//! - phase 내부 서비스 순서는 선언 순서를 따름
//! - 순환 의존성은 [`ConfigError::DependencyCycle`]로 보고
//!
//! 바이패스된 서비스도 자기 phase에 그대로 남지만 시작되거나 게이트를
//! 거치지 않습니다. 해당 서비스가 외부에서 이미 도달 가능하다는 가정은
//! [`Plan::bypass_assumptions`]로 명시됩니다.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::gate::{GateOverride, GatePolicy};
use crate::probe::Probe;

/// 서비스 하나의 선언
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// 고유 서비스 이름 (컨테이너 이름으로도 사용)
    pub name: String,
    /// 먼저 준비되어야 하는 서비스 이름 목록
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// 외부에서 이미 실행 중인 것으로 간주할지 여부
    #[serde(default)]
    pub bypass: bool,
    /// 준비 판정 프로브. 없으면 시작 즉시 준비 완료로 간주
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<Probe>,
    /// 컨테이너 시작 명세
    pub container: ContainerSpec,
    /// 게이트 정책 오버라이드
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateOverride>,
    /// `wipe_data_on_start` 시 삭제할 데이터 볼륨
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_volumes: Vec<String>,
}

/// 컨테이너 시작 명세
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSpec {
    /// 이미지 참조 (예: `postgres:16`)
    pub image: String,
    /// 이미지 기본 명령을 대체할 인자 목록
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// 환경 변수
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// 포트 매핑 (`"호스트포트:컨테이너포트[/tcp|/udp]"`)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    /// 볼륨 바인딩 (`"볼륨또는경로:컨테이너경로"`)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    /// 연결할 네트워크. 없으면 `[deploy] network` 사용
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// 추가 호스트 매핑 (`"이름:IP"`)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_hosts: Vec<String>,
}

impl ServiceDescriptor {
    /// 이미지만 지정한 최소 서비스 선언을 생성합니다.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            bypass: false,
            readiness: None,
            container: ContainerSpec {
                image: image.into(),
                ..ContainerSpec::default()
            },
            gate: None,
            data_volumes: Vec::new(),
        }
    }

    /// 의존 대상을 추가합니다.
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }

    /// readiness 프로브를 설정합니다.
    pub fn with_readiness(mut self, probe: Probe) -> Self {
        self.readiness = Some(probe);
        self
    }

    /// 바이패스 여부를 설정합니다.
    pub fn bypassed(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    /// 선언 자체의 유효성을 검증합니다 (다른 서비스와의 관계 제외).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "services.name".to_owned(),
                reason: "service name must not be empty".to_owned(),
            });
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(ConfigError::InvalidValue {
                field: format!("services.{}.name", self.name),
                reason: "only ASCII letters, digits, '-', '_' and '.' are allowed".to_owned(),
            });
        }
        if !self.bypass && self.container.image.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("services.{}.container.image", self.name),
                reason: "image must not be empty".to_owned(),
            });
        }
        for port in &self.container.ports {
            validate_port_mapping(port).map_err(|reason| ConfigError::InvalidValue {
                field: format!("services.{}.container.ports", self.name),
                reason,
            })?;
        }
        if let Some(probe) = &self.readiness {
            probe.validate(&format!("service '{}' readiness", self.name))?;
        }
        Ok(())
    }
}

fn validate_port_mapping(mapping: &str) -> Result<(), String> {
    let (host, container) = mapping
        .split_once(':')
        .ok_or_else(|| format!("'{mapping}' must have the form host:container"))?;
    let container = ["/tcp", "/udp"]
        .iter()
        .find_map(|protocol| container.strip_suffix(*protocol))
        .unwrap_or(container);
    for part in [host, container] {
        match part.parse::<u16>() {
            Ok(port) if port > 0 => {}
            _ => return Err(format!("'{mapping}' contains an invalid port '{part}'")),
        }
    }
    Ok(())
}

/// 검증된 서비스 집합
///
/// 생성 시점에 이름 중복, 알 수 없는 의존 대상, 자기 의존을 거부합니다.
/// 순환 의존성은 [`Plan::build`]에서 검출됩니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    services: Vec<ServiceDescriptor>,
    wipe_data_on_start: bool,
}

impl Topology {
    /// 서비스 목록으로 토폴로지를 생성합니다.
    pub fn new(services: Vec<ServiceDescriptor>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for service in &services {
            service.validate()?;
            if !seen.insert(service.name.as_str()) {
                return Err(ConfigError::DuplicateService {
                    name: service.name.clone(),
                });
            }
        }

        for service in &services {
            for dependency in &service.depends_on {
                if dependency == &service.name {
                    return Err(ConfigError::DependencyCycle {
                        cycle: vec![service.name.clone(), service.name.clone()],
                    });
                }
                if !seen.contains(dependency.as_str()) {
                    return Err(ConfigError::UnknownDependency {
                        service: service.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        Ok(Self {
            services,
            wipe_data_on_start: false,
        })
    }

    /// 선언 순서대로 서비스를 반환합니다.
    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    /// 이름으로 서비스를 찾습니다.
    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }

    /// 시작 전 데이터 볼륨 삭제 여부
    pub fn wipe_data_on_start(&self) -> bool {
        self.wipe_data_on_start
    }

    /// 데이터 볼륨 삭제 여부를 설정합니다.
    pub fn with_wipe_data_on_start(mut self, wipe: bool) -> Self {
        self.wipe_data_on_start = wipe;
        self
    }

    /// 추가로 바이패스할 서비스를 지정합니다.
    ///
    /// 선언되지 않은 이름은 [`ConfigError::UnknownService`]입니다.
    pub fn with_bypassed<I, S>(mut self, names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            let service = self
                .services
                .iter_mut()
                .find(|s| s.name == name)
                .ok_or_else(|| ConfigError::UnknownService {
                    name: name.to_owned(),
                })?;
            service.bypass = true;
        }
        Ok(self)
    }

    /// 바이패스된 서비스 이름 (선언 순서)
    pub fn bypassed(&self) -> Vec<&str> {
        self.services
            .iter()
            .filter(|s| s.bypass)
            .map(|s| s.name.as_str())
            .collect()
    }

    /// 주어진 서비스에 직접 또는 간접적으로 의존하는 서비스 (선언 순서)
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        let mut affected: HashSet<&str> = HashSet::from([name]);
        // 고정점까지 반복: 서비스 수가 적으므로 단순 반복으로 충분
        loop {
            let before = affected.len();
            for service in &self.services {
                if service
                    .depends_on
                    .iter()
                    .any(|d| affected.contains(d.as_str()))
                {
                    affected.insert(service.name.as_str());
                }
            }
            if affected.len() == before {
                break;
            }
        }
        self.services
            .iter()
            .map(|s| s.name.as_str())
            .filter(|n| *n != name && affected.contains(n))
            .collect()
    }
}

/// phase 하나
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Phase {
    /// 0부터 시작하는 phase 번호
    pub index: usize,
    /// 이 phase의 서비스 이름 (선언 순서)
    pub services: Vec<String>,
}

/// 바이패스된 서비스에 대한 명시적 전제 조건
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BypassAssumption {
    /// 바이패스된 서비스
    pub service: String,
    /// 이 서비스가 이미 도달 가능하다고 가정하는 서비스들
    pub relied_on_by: Vec<String>,
}

/// 배포 계획
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    phases: Vec<Phase>,
    bypass_assumptions: Vec<BypassAssumption>,
}

impl Plan {
    /// 토폴로지를 phase 목록으로 계층화합니다 (Kahn 알고리즘).
    ///
    /// 모든 서비스는 정확히 하나의 phase에 속하며, 의존 대상은 항상 더
    /// 앞선 phase에 위치합니다.
    pub fn build(topology: &Topology) -> Result<Self, ConfigError> {
        let services = topology.services();
        let index_of: HashMap<&str, usize> = services
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        let mut in_degree = vec![0usize; services.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); services.len()];
        for (i, service) in services.iter().enumerate() {
            for dependency in &service.depends_on {
                let Some(&d) = index_of.get(dependency.as_str()) else {
                    return Err(ConfigError::UnknownDependency {
                        service: service.name.clone(),
                        dependency: dependency.clone(),
                    });
                };
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }

        let mut level = vec![0usize; services.len()];
        let mut ready: Vec<usize> = (0..services.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut visited = 0usize;

        while let Some(current) = ready.pop() {
            visited += 1;
            for &next in &dependents[current] {
                level[next] = level[next].max(level[current] + 1);
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(next);
                }
            }
        }

        if visited != services.len() {
            return Err(ConfigError::DependencyCycle {
                cycle: find_cycle(services, &index_of),
            });
        }

        let depth = level.iter().copied().max().map_or(0, |max| max + 1);
        let mut phases: Vec<Phase> = (0..depth)
            .map(|index| Phase {
                index,
                services: Vec::new(),
            })
            .collect();
        for (i, service) in services.iter().enumerate() {
            phases[level[i]].services.push(service.name.clone());
        }

        let bypass_assumptions = topology
            .bypassed()
            .into_iter()
            .map(|name| BypassAssumption {
                service: name.to_owned(),
                relied_on_by: topology
                    .dependents_of(name)
                    .into_iter()
                    .map(str::to_owned)
                    .collect(),
            })
            .collect();

        Ok(Self {
            phases,
            bypass_assumptions,
        })
    }

    /// phase 목록 (오름차순)
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// 바이패스 전제 조건 목록
    pub fn bypass_assumptions(&self) -> &[BypassAssumption] {
        &self.bypass_assumptions
    }

    /// 전체 배포가 실패로 판정되기까지의 최악 대기 시간
    ///
    /// phase 내부 게이트는 동시에 진행되므로 phase별로 가장 느린 게이트를
    /// 합산합니다. 바이패스되었거나 프로브가 없는 서비스는 0으로 계산합니다.
    pub fn worst_case_wait(
        &self,
        topology: &Topology,
        defaults: GatePolicy,
        probe_timeout: Duration,
    ) -> Duration {
        self.phases
            .iter()
            .map(|phase| {
                phase
                    .services
                    .iter()
                    .filter_map(|name| topology.get(name))
                    .filter(|s| !s.bypass)
                    .filter_map(|s| {
                        let probe = s.readiness.as_ref()?;
                        let timeout = probe
                            .timeout_ms
                            .map(Duration::from_millis)
                            .unwrap_or(probe_timeout);
                        Some(defaults.with_override(s.gate.as_ref()).worst_case_wait(timeout))
                    })
                    .max()
                    .unwrap_or(Duration::ZERO)
            })
            .sum()
    }
}

/// DFS로 순환 경로 하나를 찾아 `a -> b -> a` 형태로 반환합니다.
fn find_cycle(services: &[ServiceDescriptor], index_of: &HashMap<&str, usize>) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit(
        node: usize,
        services: &[ServiceDescriptor],
        index_of: &HashMap<&str, usize>,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<String>> {
        marks[node] = Mark::InProgress;
        stack.push(node);
        for dependency in &services[node].depends_on {
            let Some(&next) = index_of.get(dependency.as_str()) else {
                continue;
            };
            match marks[next] {
                Mark::InProgress => {
                    let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                    let mut cycle: Vec<String> = stack[start..]
                        .iter()
                        .map(|&n| services[n].name.clone())
                        .collect();
                    cycle.push(services[next].name.clone());
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = visit(next, services, index_of, marks, stack) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }
        stack.pop();
        marks[node] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::Unvisited; services.len()];
    let mut stack = Vec::new();
    for start in 0..services.len() {
        if marks[start] == Mark::Unvisited
            && let Some(cycle) = visit(start, services, index_of, &mut marks, &mut stack)
        {
            return cycle;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(name: &str, deps: &[&str]) -> ServiceDescriptor {
        deps.iter()
            .fold(ServiceDescriptor::new(name, format!("{name}:latest")), |s, d| {
                s.depends_on(*d)
            })
    }

    fn phase_names(plan: &Plan) -> Vec<Vec<&str>> {
        plan.phases()
            .iter()
            .map(|p| p.services.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn linear_chain_gets_one_phase_per_service() {
        let topology = Topology::new(vec![
            svc("db", &[]),
            svc("engine", &["db"]),
            svc("api", &["engine"]),
        ])
        .unwrap();
        let plan = Plan::build(&topology).unwrap();
        assert_eq!(phase_names(&plan), vec![vec!["db"], vec!["engine"], vec!["api"]]);
    }

    #[test]
    fn independent_services_share_a_phase_in_declaration_order() {
        let topology = Topology::new(vec![
            svc("zookeeper", &[]),
            svc("postgres", &[]),
            svc("kafka", &["zookeeper"]),
            svc("connect", &["kafka", "postgres"]),
        ])
        .unwrap();
        let plan = Plan::build(&topology).unwrap();
        assert_eq!(
            phase_names(&plan),
            vec![vec!["zookeeper", "postgres"], vec!["kafka"], vec!["connect"]]
        );
    }

    #[test]
    fn longest_path_decides_the_phase() {
        // api는 db에 직접 의존하지만 engine 때문에 phase 2에 위치
        let topology = Topology::new(vec![
            svc("api", &["db", "engine"]),
            svc("db", &[]),
            svc("engine", &["db"]),
        ])
        .unwrap();
        let plan = Plan::build(&topology).unwrap();
        assert_eq!(phase_names(&plan), vec![vec!["db"], vec!["engine"], vec!["api"]]);
    }

    #[test]
    fn every_dependency_is_in_an_earlier_phase() {
        let topology = Topology::new(vec![
            svc("a", &[]),
            svc("b", &["a"]),
            svc("c", &["a"]),
            svc("d", &["b", "c"]),
            svc("e", &[]),
            svc("f", &["e", "d"]),
        ])
        .unwrap();
        let plan = Plan::build(&topology).unwrap();
        let phase_of: HashMap<&str, usize> = plan
            .phases()
            .iter()
            .flat_map(|p| p.services.iter().map(move |s| (s.as_str(), p.index)))
            .collect();
        assert_eq!(phase_of.len(), 6);
        for service in topology.services() {
            for dep in &service.depends_on {
                assert!(phase_of[dep.as_str()] < phase_of[service.name.as_str()]);
            }
        }
    }

    #[test]
    fn empty_topology_has_no_phases() {
        let plan = Plan::build(&Topology::new(Vec::new()).unwrap()).unwrap();
        assert!(plan.phases().is_empty());
    }

    #[test]
    fn cycle_is_reported_with_its_members() {
        let topology = Topology::new(vec![
            svc("db", &[]),
            svc("a", &["c", "db"]),
            svc("b", &["a"]),
            svc("c", &["b"]),
        ])
        .unwrap();
        let err = Plan::build(&topology).unwrap_err();
        match err {
            ConfigError::DependencyCycle { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                for name in ["a", "b", "c"] {
                    assert!(cycle.iter().any(|n| n == name), "{name} missing from {cycle:?}");
                }
                assert!(!cycle.iter().any(|n| n == "db"));
            }
            other => panic!("expected DependencyCycle, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = Topology::new(vec![svc("a", &["a"])]).unwrap_err();
        assert!(matches!(err, ConfigError::DependencyCycle { .. }));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = Topology::new(vec![svc("db", &[]), svc("db", &[])]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateService { name } if name == "db"));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = Topology::new(vec![svc("api", &["cache"])]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownDependency { service, dependency }
                if service == "api" && dependency == "cache"
        ));
    }

    #[test]
    fn invalid_port_mapping_is_rejected() {
        let mut service = svc("db", &[]);
        service.container.ports.push("5432".to_owned());
        assert!(Topology::new(vec![service]).is_err());
    }

    #[test]
    fn port_mapping_accepts_tcp_and_udp_suffix() {
        let mut service = svc("dns", &[]);
        service.container.ports.extend([
            "5353:53/udp".to_owned(),
            "8053:53/tcp".to_owned(),
            "9000:9000".to_owned(),
        ]);
        assert!(Topology::new(vec![service]).is_ok());

        let mut service = svc("dns", &[]);
        service.container.ports.push("5353:53/sctp".to_owned());
        assert!(Topology::new(vec![service]).is_err());
    }

    #[test]
    fn bypass_keeps_phase_and_records_assumption() {
        let topology = Topology::new(vec![
            svc("db", &[]),
            svc("engine", &["db"]),
            svc("api", &["engine"]),
        ])
        .unwrap()
        .with_bypassed(["db"])
        .unwrap();
        let plan = Plan::build(&topology).unwrap();

        assert_eq!(phase_names(&plan)[0], vec!["db"]);
        assert_eq!(
            plan.bypass_assumptions(),
            &[BypassAssumption {
                service: "db".to_owned(),
                relied_on_by: vec!["engine".to_owned(), "api".to_owned()],
            }]
        );
    }

    #[test]
    fn bypassing_unknown_service_fails() {
        let err = Topology::new(vec![svc("db", &[])])
            .unwrap()
            .with_bypassed(["kafka"])
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownService { name } if name == "kafka"));
    }

    #[test]
    fn worst_case_wait_sums_slowest_gate_per_phase() {
        let mut slow = svc("kafka", &[]).with_readiness(Probe::tcp("kafka:9092"));
        slow.gate = Some(GateOverride {
            interval_ms: None,
            max_attempts: Some(4),
        });
        let fast = svc("db", &[]).with_readiness(Probe::tcp("db:5432"));
        let unprobed = svc("api", &["kafka", "db"]);
        let bypassed = svc("cache", &["api"])
            .with_readiness(Probe::tcp("cache:6379"))
            .bypassed(true);

        let topology = Topology::new(vec![slow, fast, unprobed, bypassed]).unwrap();
        let plan = Plan::build(&topology).unwrap();
        let defaults = GatePolicy::new(Duration::from_secs(1), 2);

        // phase 0: max(4×5+3×1, 2×5+1×1) = 23s, phase 1/2: 0
        assert_eq!(
            plan.worst_case_wait(&topology, defaults, Duration::from_secs(5)),
            Duration::from_secs(23)
        );
    }
}
