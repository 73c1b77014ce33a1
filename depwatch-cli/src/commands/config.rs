//! `depwatch config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use depwatch_core::config::DepwatchConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const SECTIONS: &[&str] = &["general", "index", "cache", "scan"];

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

/// Load and validate the configuration file, reporting any errors.
///
/// # Errors
///
/// Returns `CliError::Config` if the file is missing, unparsable or invalid.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = match DepwatchConfig::load(config_path).await {
        Ok(_) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: true,
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: false,
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

/// Show the effective configuration (file + env overrides + defaults).
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = super::load_effective_config(config_path).await?;
    let report = build_config_report(&config, config_path, section.as_deref())?;
    writer.render(&report)
}

/// 설정 전체 또는 한 섹션의 표시용 보고서를 만듭니다.
pub fn build_config_report(
    config: &DepwatchConfig,
    source: &Path,
    section: Option<&str>,
) -> Result<ConfigReport, CliError> {
    let toml_err = |e: toml::ser::Error| CliError::Command(format!("failed to render config: {e}"));
    let (config_toml, value) = match section {
        None => (
            toml::to_string_pretty(config).map_err(toml_err)?,
            serde_json::to_value(config)?,
        ),
        Some("general") => (
            toml::to_string_pretty(&config.general).map_err(toml_err)?,
            serde_json::to_value(&config.general)?,
        ),
        Some("index") => (
            toml::to_string_pretty(&config.index).map_err(toml_err)?,
            serde_json::to_value(&config.index)?,
        ),
        Some("cache") => (
            toml::to_string_pretty(&config.cache).map_err(toml_err)?,
            serde_json::to_value(&config.cache)?,
        ),
        Some("scan") => (
            toml::to_string_pretty(&config.scan).map_err(toml_err)?,
            serde_json::to_value(&config.scan)?,
        ),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: {})",
                SECTIONS.join(", ")
            )));
        }
    };
    Ok(ConfigReport {
        source: source.display().to_string(),
        section: section.map(str::to_owned),
        config: value,
        config_toml,
    })
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.valid {
            writeln!(w, "Configuration is valid: {}", self.source)?;
        } else {
            writeln!(w, "Configuration is invalid: {}", self.source)?;
            for error in &self.errors {
                writeln!(w, "  - {error}")?;
            }
        }
        Ok(())
    }
}

/// Configuration display report.
///
/// `config_toml` is used only for text rendering.
#[derive(Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub config: serde_json::Value,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        match self.section {
            Some(ref section) => {
                writeln!(w, "Configuration [{section}] (source: {})", self.source)?
            }
            None => writeln!(w, "Configuration (source: {})", self.source)?,
        }
        writeln!(w)?;
        write!(w, "{}", self.config_toml)
    }
}
