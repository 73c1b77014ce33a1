//! `depwatch cache` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use depwatch_auditor::{AuditServiceBuilder, AuditorConfig, CacheSummary};

use crate::cli::{CacheAction, CacheArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `cache` command.
pub async fn execute(
    args: CacheArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = super::load_effective_config(config_path).await?;
    let auditor_config = AuditorConfig::from_core(&config);
    match args.action {
        CacheAction::Show { filter } => {
            let report = build_cache_report(auditor_config, filter.as_deref())?;
            writer.render(&report)
        }
    }
}

/// 영속 캐시를 읽어 보고서를 만듭니다. 원격 인덱스에는 접근하지 않습니다.
pub fn build_cache_report(
    config: AuditorConfig,
    filter: Option<&str>,
) -> Result<CacheReport, CliError> {
    let data_dir = config.data_dir.display().to_string();
    if !config.persist {
        return Ok(CacheReport {
            data_dir,
            persist: false,
            entries: Vec::new(),
        });
    }
    info!(data_dir = %data_dir, "reading audit cache");

    let (service, _) = AuditServiceBuilder::new()
        .config(config)
        .event_channel(false)
        .build()?;
    let entries = service
        .cache_entries()?
        .into_iter()
        .filter(|row| filter.is_none_or(|f| row.key.contains(f)))
        .collect();
    Ok(CacheReport {
        data_dir,
        persist: true,
        entries,
    })
}

#[derive(Serialize)]
pub struct CacheReport {
    pub data_dir: String,
    pub persist: bool,
    pub entries: Vec<CacheSummary>,
}

impl Render for CacheReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if !self.persist {
            return writeln!(w, "Persistent cache is disabled ([cache] persist = false).");
        }
        if self.entries.is_empty() {
            return writeln!(w, "No cached audits in {}.", self.data_dir);
        }
        writeln!(w, "Cached audits ({}):", self.data_dir)?;
        writeln!(
            w,
            "{:<10} {:<8} {:>5} {:>6} {:<14} FILE",
            "STATE", "SEVERITY", "DEPS", "VULNS", "UPDATED (ms)"
        )?;
        for row in &self.entries {
            writeln!(
                w,
                "{:<10} {:<8} {:>5} {:>6} {:<14} {}",
                row.state.to_string(),
                row.severity.to_string(),
                row.dependencies,
                row.vulnerabilities,
                row.last_updated_at,
                row.key
            )?;
        }
        Ok(())
    }
}
