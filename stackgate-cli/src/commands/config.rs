//! `stackgate config` command handler

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use stackgate_core::config::StackConfig;
use stackgate_core::probe::ProbeKind;
use stackgate_core::types::SkipCondition;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const SECTIONS: [&str; 8] = [
    "general", "gate", "deploy", "verify", "probe", "metrics", "services", "tests",
];

/// Substrings marking an env var or header as sensitive (upper-cased match).
const SENSITIVE_MARKERS: [&str; 6] = [
    "PASSWORD",
    "SECRET",
    "TOKEN",
    "KEY",
    "PRESHARED",
    "AUTHORIZATION",
];

const REDACTED: &str = "***REDACTED***";

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Loads and validates the file (topology and test suite included).
///
/// # Errors
///
/// Returns `CliError::Config` if the configuration is invalid.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = match StackConfig::load(config_path).await {
        Ok(config) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: true,
            errors: Vec::new(),
            services: config.services.len(),
            tests: config.tests.len(),
        },
        Err(e) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: false,
            errors: vec![e.to_string()],
            services: 0,
            tests: 0,
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }

    Ok(())
}

/// Shows the effective configuration (file + env overrides + defaults)
/// with secrets redacted.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let mut config = StackConfig::load(config_path).await?;
    redact_secrets(&mut config);

    let report = ConfigReport::build(&config, config_path, section)?;
    writer.render(&report)
}

/// Replaces sensitive container env values and HTTP header values,
/// including the precondition probes of `probe_fails` skip conditions.
fn redact_secrets(config: &mut StackConfig) {
    for service in &mut config.services {
        redact_map(&mut service.container.env);
        if let Some(probe) = &mut service.readiness {
            redact_probe(&mut probe.kind);
        }
    }
    for case in &mut config.tests {
        redact_probe(&mut case.probe.kind);
        if let Some(SkipCondition::ProbeFails { probe }) = &mut case.skip_if {
            redact_probe(&mut probe.kind);
        }
    }
}

fn redact_probe(kind: &mut ProbeKind) {
    if let ProbeKind::Http { headers, .. } = kind {
        redact_map(headers);
    }
}

fn redact_map(values: &mut BTreeMap<String, String>) {
    for (key, value) in values.iter_mut() {
        if is_sensitive(key) {
            *value = REDACTED.to_owned();
        }
    }
}

fn is_sensitive(key: &str) -> bool {
    let key = key.to_ascii_uppercase();
    SENSITIVE_MARKERS.iter().any(|marker| key.contains(marker))
}

fn section_toml<T: Serialize>(name: &str, value: &T) -> Result<String, CliError> {
    toml::to_string_pretty(&BTreeMap::from([(name, value)]))
        .map_err(|e| CliError::Command(format!("failed to render [{name}]: {e}")))
}

/// Configuration display report.
///
/// The `config_toml` field is skipped during JSON serialization (only used for text rendering).
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Serialized TOML configuration (with redacted secrets)
    #[serde(skip)]
    pub config_toml: String,
}

impl ConfigReport {
    /// Serializes either one section or the whole file.
    ///
    /// # Errors
    ///
    /// Returns `CliError::Command` for an unknown section name.
    pub fn build(
        config: &StackConfig,
        source: &Path,
        section: Option<String>,
    ) -> Result<Self, CliError> {
        let config_toml = match section.as_deref() {
            None => toml::to_string_pretty(config)
                .map_err(|e| CliError::Command(format!("failed to render config: {e}")))?,
            Some("general") => section_toml("general", &config.general)?,
            Some("gate") => section_toml("gate", &config.gate)?,
            Some("deploy") => section_toml("deploy", &config.deploy)?,
            Some("verify") => section_toml("verify", &config.verify)?,
            Some("probe") => section_toml("probe", &config.probe)?,
            Some("metrics") => section_toml("metrics", &config.metrics)?,
            Some("services") => section_toml("services", &config.services)?,
            Some("tests") => section_toml("tests", &config.tests)?,
            Some(other) => {
                return Err(CliError::Command(format!(
                    "unknown section: {} (expected: {})",
                    other,
                    SECTIONS.join(", ")
                )));
            }
        };

        Ok(Self {
            source: source.display().to_string(),
            section,
            config_toml,
        })
    }
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    /// Configuration file path
    pub source: String,
    /// Whether the configuration is valid
    pub valid: bool,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
    /// Number of declared services
    pub services: usize,
    /// Number of declared test cases
    pub tests: usize,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
            writeln!(w, "  Services: {}", self.services)?;
            writeln!(w, "  Tests: {}", self.tests)?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STACK: &str = r#"
[gate]
max_attempts = 12

[[services]]
name = "relations-api"
readiness = { kind = "http", url = "http://localhost:8000/api/authz/livez", headers = { Authorization = "Bearer abc" } }
container = { image = "relations-api:latest", env = { SPICEDB_PRESHARED = "devkey", LOG_LEVEL = "debug" } }

[[tests]]
name = "livez"
probe = { kind = "http", url = "http://localhost:8000/api/authz/livez", headers = { "X-Api-Token" = "t0k3n" } }

[[tests]]
name = "check"
category = "relations"
probe = { kind = "http", url = "http://localhost:8000/api/authz/v1beta1/check" }
skip_if = { when = "probe_fails", probe = { kind = "http", url = "http://localhost:8000/api/authz/v1beta1/readyz", headers = { Authorization = "Bearer schema-admin" } } }
"#;

    fn redacted() -> StackConfig {
        let mut config = StackConfig::parse(STACK).expect("parse");
        redact_secrets(&mut config);
        config
    }

    #[test]
    fn test_redacts_sensitive_env_and_headers() {
        let config = redacted();
        let service = &config.services[0];

        assert_eq!(service.container.env["SPICEDB_PRESHARED"], REDACTED);
        assert_eq!(service.container.env["LOG_LEVEL"], "debug");
        match &service.readiness.as_ref().expect("probe").kind {
            ProbeKind::Http { headers, .. } => assert_eq!(headers["Authorization"], REDACTED),
            other => panic!("unexpected probe kind: {other:?}"),
        }
        match &config.tests[0].probe.kind {
            ProbeKind::Http { headers, .. } => assert_eq!(headers["X-Api-Token"], REDACTED),
            other => panic!("unexpected probe kind: {other:?}"),
        }
    }

    #[test]
    fn test_redacts_skip_condition_headers() {
        let config = redacted();

        match &config.tests[1].skip_if {
            Some(SkipCondition::ProbeFails { probe }) => match &probe.kind {
                ProbeKind::Http { headers, .. } => assert_eq!(headers["Authorization"], REDACTED),
                other => panic!("unexpected probe kind: {other:?}"),
            },
            other => panic!("unexpected skip condition: {other:?}"),
        }

        let report =
            ConfigReport::build(&config, Path::new("stackgate.toml"), Some("tests".to_owned()))
                .expect("tests section");
        assert!(!report.config_toml.contains("schema-admin"));
    }

    #[test]
    fn test_sensitive_key_matching_is_case_insensitive() {
        assert!(is_sensitive("db_password"));
        assert!(is_sensitive("ApiKey"));
        assert!(!is_sensitive("LOG_LEVEL"));
    }

    #[test]
    fn test_show_single_section() {
        let report =
            ConfigReport::build(&redacted(), Path::new("stackgate.toml"), Some("gate".to_owned()))
                .expect("gate section");

        assert!(report.config_toml.starts_with("[gate]"));
        assert!(report.config_toml.contains("max_attempts = 12"));
    }

    #[test]
    fn test_show_full_config_never_leaks_secrets() {
        let report =
            ConfigReport::build(&redacted(), Path::new("stackgate.toml"), None).expect("full");

        assert!(report.config_toml.contains("relations-api"));
        assert!(!report.config_toml.contains("devkey"));
        assert!(!report.config_toml.contains("Bearer abc"));
    }

    #[test]
    fn test_show_unknown_section_is_rejected() {
        let result = ConfigReport::build(
            &redacted(),
            Path::new("stackgate.toml"),
            Some("brokers".to_owned()),
        );
        let err = result.err().expect("unknown section");
        assert!(err.to_string().contains("unknown section: brokers"));
    }

    #[test]
    fn test_config_report_json_skips_toml_body() {
        let report = ConfigReport {
            source: "test.toml".to_owned(),
            section: Some("deploy".to_owned()),
            config_toml: "network = \"stackgate\"".to_owned(),
        };

        let parsed = serde_json::to_value(&report).expect("JSON serialization should succeed");

        assert_eq!(parsed["source"].as_str(), Some("test.toml"));
        assert_eq!(parsed["section"].as_str(), Some("deploy"));
        assert!(parsed.get("config_toml").is_none());
    }

    #[test]
    fn test_config_validation_report_invalid() {
        colored::control::set_override(false);
        let report = ConfigValidationReport {
            source: "bad.toml".to_owned(),
            valid: false,
            errors: vec!["service 'api' depends on unknown service 'db'".to_owned()],
            services: 0,
            tests: 0,
        };

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("INVALID"));
        assert!(output.contains("unknown service 'db'"));
    }

    #[tokio::test]
    async fn test_validate_reports_invalid_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stackgate.toml");
        tokio::fs::write(&path, "[[services]]\nname = \"api\"\ndepends_on = [\"db\"]\ncontainer = { image = \"api\" }\n")
            .await
            .expect("write");

        let writer = OutputWriter::new(crate::cli::OutputFormat::Json);
        let err = execute_validate(&path, &writer).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
