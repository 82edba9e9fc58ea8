//! `stackgate teardown` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use stackgate_core::config::StackConfig;
use stackgate_core::topology::Topology;

use crate::cli::TeardownArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `teardown` command.
///
/// Removes every managed container in reverse declaration order. Services
/// bypassed in config are left running since stackgate never started them.
pub async fn execute(
    args: TeardownArgs,
    config: &StackConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let topology = config.topology()?;
    let runtime = super::container_runtime(config)?;

    info!(volumes = args.volumes, "tearing down stack");
    stackgate_deploy::teardown(runtime.as_ref(), &topology, args.volumes).await?;

    writer.render(&TeardownReport::new(&topology, args.volumes))
}

/// Services that were removed (or left alone).
#[derive(Debug, Serialize)]
pub struct TeardownReport {
    pub removed: Vec<String>,
    pub kept: Vec<String>,
    pub volumes_removed: bool,
}

impl TeardownReport {
    pub fn new(topology: &Topology, volumes_removed: bool) -> Self {
        let (kept, removed): (Vec<_>, Vec<_>) = topology
            .services()
            .iter()
            .rev()
            .partition(|service| service.bypass);
        Self {
            removed: removed.into_iter().map(|s| s.name.clone()).collect(),
            kept: kept.into_iter().map(|s| s.name.clone()).collect(),
            volumes_removed,
        }
    }
}

impl Render for TeardownReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        for name in &self.removed {
            writeln!(w, "  removed  {name}")?;
        }
        for name in &self.kept {
            writeln!(w, "  kept     {name} (bypassed)")?;
        }
        if self.volumes_removed {
            writeln!(w, "Data volumes removed.")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use stackgate_core::topology::ServiceDescriptor;

    use super::*;

    #[test]
    fn test_report_lists_services_in_reverse_order() {
        let topology = Topology::new(vec![
            ServiceDescriptor::new("db", "postgres:16"),
            ServiceDescriptor::new("cache", "redis:7").bypassed(true),
            ServiceDescriptor::new("api", "api:latest").depends_on("db"),
        ])
        .expect("topology");

        let report = TeardownReport::new(&topology, false);

        assert_eq!(report.removed, vec!["api", "db"]);
        assert_eq!(report.kept, vec!["cache"]);

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let text = String::from_utf8(buffer).expect("utf8");
        assert!(text.starts_with("  removed  api\n"));
        assert!(!text.contains("volumes"));
    }
}
