//! `stackgate plan` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use stackgate_core::config::StackConfig;
use stackgate_core::topology::{BypassAssumption, Phase, Plan, Topology};

use crate::cli::PlanArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `plan` command. Never touches the container runtime.
pub async fn execute(
    args: PlanArgs,
    config: &StackConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let topology = super::resolve_topology(config, &args.skip)?;
    let report = PlanReport::build(config, &topology)?;
    info!(
        phases = report.phases.len(),
        worst_case_wait_secs = report.worst_case_wait_secs,
        "deployment plan computed"
    );
    writer.render(&report)
}

/// Phase listing with bypass assumptions and the worst-case wait.
#[derive(Debug, Serialize)]
pub struct PlanReport {
    pub phases: Vec<PhaseView>,
    pub bypass_assumptions: Vec<BypassAssumption>,
    /// Sum over phases of the slowest gate.
    pub worst_case_wait_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct PhaseView {
    pub index: usize,
    pub services: Vec<ServiceView>,
}

#[derive(Debug, Serialize)]
pub struct ServiceView {
    pub name: String,
    pub bypass: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<String>,
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl PlanReport {
    pub fn build(config: &StackConfig, topology: &Topology) -> Result<Self, CliError> {
        let plan = Plan::build(topology)?;
        let worst = plan.worst_case_wait(topology, config.gate_policy(), config.probe_timeout());

        Ok(Self {
            phases: plan
                .phases()
                .iter()
                .map(|phase| phase_view(config, topology, phase))
                .collect(),
            bypass_assumptions: plan.bypass_assumptions().to_vec(),
            worst_case_wait_secs: worst.as_secs(),
        })
    }
}

fn phase_view(config: &StackConfig, topology: &Topology, phase: &Phase) -> PhaseView {
    PhaseView {
        index: phase.index,
        services: phase
            .services
            .iter()
            .filter_map(|name| topology.get(name))
            .map(|service| {
                let policy = config.gate_policy_for(service);
                ServiceView {
                    name: service.name.clone(),
                    bypass: service.bypass,
                    probe: service
                        .readiness
                        .as_ref()
                        .map(|p| format!("{} {}", p.kind_name(), p.target())),
                    max_attempts: policy.max_attempts,
                    interval_ms: u64::try_from(policy.interval.as_millis()).unwrap_or(u64::MAX),
                }
            })
            .collect(),
    }
}

impl Render for PlanReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "{}", "Deployment plan".bold())?;
        for phase in &self.phases {
            writeln!(w)?;
            writeln!(w, "Phase {}", phase.index)?;
            for service in &phase.services {
                if service.bypass {
                    writeln!(w, "  {:<20} {}", service.name, "bypassed".yellow())?;
                    continue;
                }
                match &service.probe {
                    Some(probe) => writeln!(
                        w,
                        "  {:<20} {probe} (max {} attempts, every {}ms)",
                        service.name, service.max_attempts, service.interval_ms
                    )?,
                    None => writeln!(w, "  {:<20} {}", service.name, "no readiness probe".dimmed())?,
                }
            }
        }

        if !self.bypass_assumptions.is_empty() {
            writeln!(w)?;
            writeln!(w, "{}", "Bypass assumptions".bold())?;
            for assumption in &self.bypass_assumptions {
                writeln!(
                    w,
                    "  {} must already be reachable by: {}",
                    assumption.service.yellow(),
                    assumption.relied_on_by.join(", ")
                )?;
            }
        }

        writeln!(w)?;
        writeln!(w, "Worst-case readiness wait: {}s", self.worst_case_wait_secs)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STACK: &str = r#"
[gate]
interval_ms = 1000
max_attempts = 10
probe_timeout_ms = 2000

[[services]]
name = "db"
readiness = { kind = "tcp", address = "localhost:5432" }
container = { image = "postgres:16" }

[[services]]
name = "engine"
depends_on = ["db"]
readiness = { kind = "tcp", address = "localhost:50051" }
container = { image = "spicedb:latest" }

[[services]]
name = "api"
depends_on = ["engine"]
container = { image = "api:latest" }
"#;

    #[test]
    fn test_plan_report_lists_phases_and_wait() {
        let config = StackConfig::parse(STACK).expect("parse");
        let topology = config.topology().expect("topology");

        let report = PlanReport::build(&config, &topology).expect("plan");

        assert_eq!(report.phases.len(), 3);
        assert_eq!(report.phases[1].services[0].name, "engine");
        // 두 게이트 x (10 x 2s + 9 x 1s), api는 프로브 없음
        assert_eq!(report.worst_case_wait_secs, 58);
        assert!(report.bypass_assumptions.is_empty());
    }

    #[test]
    fn test_plan_report_shows_bypass_assumption() {
        colored::control::set_override(false);
        let config = StackConfig::parse(STACK).expect("parse");
        let topology = config
            .topology()
            .expect("topology")
            .with_bypassed(["engine"])
            .expect("bypass");

        let report = PlanReport::build(&config, &topology).expect("plan");
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let text = String::from_utf8(buffer).expect("utf8");

        assert_eq!(report.worst_case_wait_secs, 29);
        assert!(text.contains("engine must already be reachable by: api"));
        assert!(text.contains("bypassed"));
        assert!(text.contains("tcp localhost:5432 (max 10 attempts, every 1000ms)"));
    }

    #[test]
    fn test_plan_json_shape() {
        let config = StackConfig::parse(STACK).expect("parse");
        let topology = config.topology().expect("topology");
        let report = PlanReport::build(&config, &topology).expect("plan");

        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["phases"][0]["services"][0]["name"], "db");
        assert!(json["phases"][2]["services"][0].get("probe").is_none());
    }
}
