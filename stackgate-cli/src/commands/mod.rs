//! Command handlers -- one module per subcommand

pub mod config;
pub mod deploy;
pub mod export;
pub mod plan;
pub mod teardown;
pub mod validate;
pub mod verify;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use stackgate_core::config::StackConfig;
use stackgate_core::probe::NetworkProbeClient;
use stackgate_core::topology::Topology;
use stackgate_deploy::BollardRuntime;

use crate::cli::SkipArgs;
use crate::error::CliError;

/// Topology from config with `--skip` services additionally bypassed.
pub(crate) fn resolve_topology(config: &StackConfig, skip: &SkipArgs) -> Result<Topology, CliError> {
    Ok(config.topology()?.with_bypassed(&skip.skip)?)
}

pub(crate) fn probe_client(config: &StackConfig) -> Result<Arc<NetworkProbeClient>, CliError> {
    let client = NetworkProbeClient::new(
        config.probe_timeout(),
        config.probe.rpc_health_command.clone(),
    )
    .map_err(|e| CliError::Command(format!("failed to build probe client: {e}")))?;
    Ok(Arc::new(client))
}

pub(crate) fn container_runtime(config: &StackConfig) -> Result<Arc<BollardRuntime>, CliError> {
    Ok(Arc::new(BollardRuntime::connect(&config.deploy.docker_socket)?))
}

/// Token cancelled on the first Ctrl-C.
pub(crate) fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            trigger.cancel();
        }
    });
    token
}
