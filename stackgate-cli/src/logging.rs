//! Logging initialization for the stackgate binary.
//!
//! Configures `tracing-subscriber` from the `[general]` section of
//! `StackConfig`. Logs are written to stderr so command output on stdout
//! stays machine-readable.
//!
//! Filter precedence: `--log-level` > `RUST_LOG` > `general.log_level`.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use stackgate_core::config::GeneralConfig;

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
///
/// # Formats
///
/// * `"json"` - Machine-parseable JSON lines
/// * `"pretty"` - Human-readable output (default)
pub fn init_tracing(config: &GeneralConfig, level_override: Option<&str>) -> Result<()> {
    let env_filter = build_filter(config, level_override)?;

    match config.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("failed to initialize JSON tracing subscriber: {}", e)
                })?;
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("failed to initialize pretty tracing subscriber: {}", e)
                })?;
        }
        _ => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                config.log_format
            ));
        }
    }

    Ok(())
}

fn build_filter(config: &GeneralConfig, level_override: Option<&str>) -> Result<EnvFilter> {
    if let Some(level) = level_override {
        return EnvFilter::try_new(level)
            .map_err(|e| anyhow::anyhow!("invalid --log-level '{}': {}", level, e));
    }
    Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
}
