//! Stackgate CLI — 로컬 서비스 스택의 단계적 배포 및 검증 도구
//!
//! 종료 코드는 [`CliError::exit_code`]를 따릅니다.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;

use stackgate_core::config::{GeneralConfig, StackConfig};

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);

    // config 명령은 설정 파일 자체를 다루므로 기본 로깅으로 시작
    if let Commands::Config(args) = cli.command {
        init_logging(&GeneralConfig::default(), cli.log_level.as_deref())?;
        return commands::config::execute(args, &cli.config, &writer).await;
    }

    let config = StackConfig::load(&cli.config).await?;
    init_logging(&config.general, cli.log_level.as_deref())?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    match cli.command {
        Commands::Deploy(args) => commands::deploy::execute(args, &config, &writer).await,
        Commands::Verify(args) => commands::verify::execute(args, &config, &writer).await,
        Commands::Validate(args) => commands::validate::execute(args, &config, &writer).await,
        Commands::Plan(args) => commands::plan::execute(args, &config, &writer).await,
        Commands::Teardown(args) => commands::teardown::execute(args, &config, &writer).await,
        Commands::Export(args) => commands::export::execute(args, &config).await,
        Commands::Config(_) => Ok(()),
    }
}

fn init_logging(config: &GeneralConfig, level_override: Option<&str>) -> Result<(), CliError> {
    logging::init_tracing(config, level_override).map_err(|e| CliError::Config(e.to_string()))
}
