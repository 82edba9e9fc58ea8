//! `stackgate deploy` command handler
//!
//! Plan → pre-run cleanup → phased bring-up → verification suite → report.

use std::io::Write;

use serde::Serialize;
use tracing::info;

use stackgate_core::config::StackConfig;
use stackgate_core::types::SkipContext;
use stackgate_deploy::{DeploymentResult, DeploymentStatus, PhaseSequencer};
use stackgate_verify::{RunReport, TestSuite};

use crate::cli::DeployArgs;
use crate::commands::verify::SuiteReport;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, render_readiness};

/// Execute the `deploy` command.
///
/// Exits unhealthy when a gate does not pass or a verification case fails.
/// Ctrl-C cancels gate polling and the suite.
pub async fn execute(
    args: DeployArgs,
    config: &StackConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let mut topology = super::resolve_topology(config, &args.skip)?;
    if args.wipe_data {
        topology = topology.with_wipe_data_on_start(true);
    }

    let runtime = super::container_runtime(config)?;
    let client = super::probe_client(config)?;
    let cancel = super::cancel_on_interrupt();

    info!(
        services = topology.services().len(),
        bypassed = ?topology.bypassed(),
        wipe_data = topology.wipe_data_on_start(),
        "starting deployment"
    );

    let deployment = PhaseSequencer::new(runtime, std::sync::Arc::clone(&client))
        .with_gate_defaults(config.gate_policy())
        .with_network(&config.deploy.network)
        .run_plan(&topology, &cancel)
        .await?;

    let run_suite = deployment.succeeded() && !args.no_verify && config.verify.run_after_deploy;
    let report = if run_suite {
        TestSuite::new(client)
            .run(&config.tests, &SkipContext::new(topology.bypassed()), &cancel)
            .await
    } else {
        RunReport::default()
    };

    let suite = SuiteReport::finish(config, report, &deployment.readiness_outcomes()).await?;
    let payload = DeployReport {
        deployment,
        verified: run_suite,
        suite,
    };
    writer.render(&payload)?;
    payload.into_result()
}

/// Deployment outcome plus the verification run that followed it.
#[derive(Debug, Serialize)]
pub struct DeployReport {
    pub deployment: DeploymentResult,
    pub verified: bool,
    pub suite: SuiteReport,
}

impl DeployReport {
    pub fn into_result(self) -> Result<(), CliError> {
        match self.deployment.status {
            DeploymentStatus::Succeeded => self.suite.into_result(),
            DeploymentStatus::Failed => Err(CliError::Unhealthy(format!(
                "deployment failed in phase {}: {} not ready",
                self.deployment.failed_phase.unwrap_or_default(),
                self.deployment.unready_services().join(", ")
            ))),
            DeploymentStatus::Cancelled => {
                Err(CliError::Unhealthy("deployment cancelled".to_owned()))
            }
        }
    }
}

impl Render for DeployReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for phase in &self.deployment.phases {
            writeln!(w, "{}", format!("Phase {}", phase.index).bold())?;
            for name in &phase.bypassed {
                writeln!(w, "  {:<20} {}", name, "BYPASSED".yellow())?;
            }
            render_readiness(w, &phase.outcomes)?;
        }

        for assumption in self.deployment.plan.bypass_assumptions() {
            writeln!(
                w,
                "  note: {} is assumed reachable by {}",
                assumption.service,
                assumption.relied_on_by.join(", ")
            )?;
        }

        let status = match self.deployment.status {
            DeploymentStatus::Succeeded => "SUCCEEDED".green().bold(),
            DeploymentStatus::Failed => "FAILED".red().bold(),
            DeploymentStatus::Cancelled => "CANCELLED".yellow().bold(),
        };
        writeln!(w)?;
        writeln!(w, "Deployment: {status}")?;
        let skipped_phases = self.deployment.plan.phases().len() - self.deployment.phases.len();
        if skipped_phases > 0 {
            writeln!(w, "  {skipped_phases} phase(s) not started")?;
        }

        writeln!(w)?;
        if self.verified {
            self.suite.render_text(w)?;
        } else {
            writeln!(w, "Verification: {}", "not run".dimmed())?;
            if let Some(dir) = &self.suite.report_dir {
                writeln!(w, "Report: {}", dir.display())?;
            }
        }
        Ok(())
    }
}
