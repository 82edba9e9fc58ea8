//! `stackgate validate` command handler
//!
//! Runs each service's readiness probe exactly once. No test cases are
//! executed and nothing is written to disk.

use tracing::info;

use stackgate_core::config::StackConfig;
use stackgate_verify::TestSuite;

use crate::cli::ValidateArgs;
use crate::commands::verify::SuiteReport;
use crate::error::CliError;
use crate::output::OutputWriter;

/// Execute the `validate` command.
pub async fn execute(
    args: ValidateArgs,
    config: &StackConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let topology = super::resolve_topology(config, &args.skip)?;
    let client = super::probe_client(config)?;
    let cancel = super::cancel_on_interrupt();

    info!(services = topology.services().len(), "taking readiness snapshot");
    let report = TestSuite::new(client)
        .readiness_snapshot(&topology, &cancel)
        .await;

    let snapshot = SuiteReport::in_memory(&report);
    writer.render(&snapshot)?;
    snapshot.into_result()
}
