//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Stackgate -- phased bring-up and verification of a local service stack.
///
/// Use `stackgate <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "stackgate", version, about, long_about = None)]
pub struct Cli {
    /// Path to the stackgate.toml configuration file.
    #[arg(short, long, global = true, default_value = "stackgate.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy the stack phase by phase, then run the verification suite.
    Deploy(DeployArgs),

    /// Run the verification suite against an already deployed stack.
    Verify(VerifyArgs),

    /// Run every readiness probe once for a fast health snapshot.
    Validate(ValidateArgs),

    /// Print the deployment phases without touching the runtime.
    Plan(PlanArgs),

    /// Remove the managed containers.
    Teardown(TeardownArgs),

    /// Serve service health as Prometheus metrics.
    Export(ExportArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

/// Services to treat as bypassed (run outside stackgate, assumed reachable).
#[derive(Args, Debug, Default, Clone)]
pub struct SkipArgs {
    /// Do not start or gate this service (repeatable).
    #[arg(long = "skip", value_name = "SERVICE")]
    pub skip: Vec<String>,
}

// ---- deploy ----

#[derive(Args, Debug)]
pub struct DeployArgs {
    #[command(flatten)]
    pub skip: SkipArgs,

    /// Remove declared data volumes before starting.
    #[arg(long)]
    pub wipe_data: bool,

    /// Do not run the verification suite after a successful deployment.
    #[arg(long)]
    pub no_verify: bool,
}

// ---- verify ----

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub skip: SkipArgs,
}

// ---- validate ----

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub skip: SkipArgs,
}

// ---- plan ----

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub skip: SkipArgs,
}

// ---- teardown ----

#[derive(Args, Debug)]
pub struct TeardownArgs {
    /// Also remove declared data volumes.
    #[arg(long)]
    pub volumes: bool,
}

// ---- export ----

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Override `[metrics] scrape_interval_secs`.
    #[arg(long, value_name = "SECS")]
    pub interval_secs: Option<u64>,
}

// ---- config ----

/// Manage stackgate configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only this section (general, gate, deploy, verify, probe, metrics, services, tests).
        #[arg(long)]
        section: Option<String>,
    },
}
