//! CLI-specific error types and exit code mapping

use stackgate_core::error::{ConfigError, StackgateError};
use stackgate_deploy::DeployError;
use stackgate_verify::VerifyError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// The stack is unhealthy: a gate did not pass or a case failed.
    #[error("{0}")]
    Unhealthy(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (report write, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from the library crates.
    #[error("{0}")]
    Core(#[from] StackgateError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                   |
    /// |------|-------------------------------------------|
    /// | 0    | Success                                   |
    /// | 1    | Unhealthy stack / general command error   |
    /// | 2    | Configuration error                       |
    /// | 10   | IO error                                  |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Io(_) => 10,
            Self::Core(StackgateError::Config(_)) => 2,
            Self::Core(StackgateError::Io(_)) => 10,
            Self::Unhealthy(_) | Self::Command(_) | Self::JsonSerialize(_) | Self::Core(_) => 1,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::Core(StackgateError::Config(e))
    }
}

impl From<DeployError> for CliError {
    fn from(e: DeployError) -> Self {
        Self::Core(e.into())
    }
}

impl From<VerifyError> for CliError {
    fn from(e: VerifyError) -> Self {
        Self::Core(e.into())
    }
}
