//! `depwatch scan` command handler

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use depwatch_auditor::{
    AuditService, AuditServiceBuilder, AuditStatus, AuditView, AuditorConfig, AuditorError,
    Ecosystem, Finding, FindingSeverity, LocalIndex,
};
use depwatch_core::config::DepwatchConfig;
use depwatch_core::plugin::Plugin;

use crate::cli::{ScanArgs, SeverityFilter};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `scan` command.
///
/// # Errors
///
/// - `CliError::Vulnerable` (exit 4): at least one dependency is affected
/// - `CliError::Connectivity` (exit 3): the index was unreachable and no file had cached results
pub async fn execute(
    args: ScanArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = super::load_effective_config(config_path).await?;
    let report = run_scan(&args, &config).await?;
    writer.render(&report)?;

    if report.summary.affected_dependencies > 0 {
        return Err(CliError::Vulnerable(format!(
            "found {} affected dependencies",
            report.summary.affected_dependencies
        )));
    }
    if !report.files.is_empty()
        && report
            .files
            .iter()
            .all(|f| f.status == FileStatus::Audit(AuditStatus::Unavailable))
    {
        return Err(CliError::Connectivity(
            "no results could be resolved or loaded from cache".to_owned(),
        ));
    }
    Ok(())
}

/// 서비스를 만들어 경로 아래 매니페스트를 감사하고 보고서를 반환합니다.
pub async fn run_scan(args: &ScanArgs, config: &DepwatchConfig) -> Result<ScanReport, CliError> {
    let mut builder = AuditServiceBuilder::new()
        .config(AuditorConfig::from_core(config))
        .event_channel(false);
    if let Some(ref file) = args.index_file {
        let file = file.clone();
        let index = tokio::task::spawn_blocking(move || LocalIndex::load(&file))
            .await
            .map_err(|e| CliError::Command(format!("failed to load index snapshot: {e}")))??;
        builder = builder.index(Arc::new(index));
    }
    let (mut service, _) = builder.build()?;
    service.init().await?;
    service.start().await?;

    let manifests = service.discover(&args.path).await?;
    info!(path = %args.path.display(), manifests = manifests.len(), refresh = args.refresh, "scanning");

    let mut outcomes = Vec::with_capacity(manifests.len());
    for path in &manifests {
        outcomes.push(audit_one(&service, path, args.refresh).await);
    }

    // stale 결과는 백그라운드 갱신이 끝난 뒤 다시 읽음
    if outcomes
        .iter()
        .any(|o| matches!(o, Ok(view) if view.status == AuditStatus::Stale))
    {
        service.wait_idle().await;
        for (path, outcome) in manifests.iter().zip(outcomes.iter_mut()) {
            if matches!(outcome, Ok(view) if view.status == AuditStatus::Stale) {
                *outcome = service.get_non_blocking(path);
            }
        }
    }
    service.stop().await?;

    let files = manifests
        .iter()
        .zip(outcomes)
        .map(|(path, outcome)| FileReport::new(path, outcome, args.min_severity))
        .collect();
    Ok(ScanReport::new(args.path.display().to_string(), files))
}

async fn audit_one(
    service: &AuditService,
    path: &Path,
    refresh: bool,
) -> Result<AuditView, AuditorError> {
    if !refresh {
        return service.get_blocking(path).await;
    }
    match service.audit_now(path).await {
        Ok(audit) => Ok(AuditView {
            audit: Some(audit),
            status: AuditStatus::Fresh,
        }),
        Err(e) if e.is_connectivity() => {
            warn!(path = %path.display(), error = %e, "refresh failed, falling back to cache");
            service.get_non_blocking(path)
        }
        Err(e) => Err(e),
    }
}

fn passes(filter: SeverityFilter, severity: FindingSeverity) -> bool {
    match filter {
        SeverityFilter::None => true,
        SeverityFilter::Info => severity >= FindingSeverity::Info,
        SeverityFilter::Error => severity >= FindingSeverity::Error,
    }
}

// ---- report ----

/// 파일 하나의 감사 상태. 감사 자체가 실패하면 `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Audit(AuditStatus),
    Failed,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audit(status) => write!(f, "{status}"),
            Self::Failed => write!(f, "error"),
        }
    }
}

impl Serialize for FileStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Serialize)]
pub struct VulnerabilityEntry {
    pub id: String,
    pub title: String,
    pub severity: FindingSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FindingEntry {
    pub name: String,
    pub version: String,
    pub line: usize,
    pub root: bool,
    pub optional: bool,
    pub resolved: bool,
    pub severity: FindingSeverity,
    pub vulnerabilities: Vec<VulnerabilityEntry>,
}

impl From<&Finding> for FindingEntry {
    fn from(finding: &Finding) -> Self {
        let dep = &finding.dependency;
        Self {
            name: dep.name.clone(),
            version: dep.effective_version().to_owned(),
            line: finding.position.line,
            root: dep.is_root,
            optional: dep.is_optional,
            resolved: dep.is_resolved(),
            severity: finding.severity,
            vulnerabilities: finding
                .vulnerabilities
                .iter()
                .map(|v| VulnerabilityEntry {
                    id: v.record.id.clone(),
                    title: v.record.title.clone(),
                    severity: v.severity,
                    url: v.record.uri.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileReport {
    pub path: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ecosystem: Option<Ecosystem>,
    pub severity: FindingSeverity,
    pub dependencies: usize,
    pub affected: usize,
    pub known_vulnerabilities: usize,
    pub findings: Vec<FindingEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    fn new(
        path: &Path,
        outcome: Result<AuditView, AuditorError>,
        filter: SeverityFilter,
    ) -> Self {
        let path = path.display().to_string();
        match outcome {
            Ok(view) => Self::from_view(path, view, filter),
            Err(e) => Self {
                path,
                status: FileStatus::Failed,
                ecosystem: None,
                severity: FindingSeverity::None,
                dependencies: 0,
                affected: 0,
                known_vulnerabilities: 0,
                findings: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    fn from_view(path: String, view: AuditView, filter: SeverityFilter) -> Self {
        let status = FileStatus::Audit(view.status);
        let Some(audit) = view.audit else {
            return Self {
                path,
                status,
                ecosystem: None,
                severity: FindingSeverity::None,
                dependencies: 0,
                affected: 0,
                known_vulnerabilities: 0,
                findings: Vec::new(),
                error: None,
            };
        };
        Self {
            path,
            status,
            ecosystem: Some(audit.ecosystem),
            severity: audit.severity(),
            dependencies: audit.dependency_count(),
            affected: audit.error_count(),
            known_vulnerabilities: audit.vulnerability_count(),
            findings: audit
                .findings
                .iter()
                .filter(|f| passes(filter, f.severity))
                .map(FindingEntry::from)
                .collect(),
            error: None,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ScanSummary {
    pub files: usize,
    pub dependencies: usize,
    pub affected_dependencies: usize,
    pub known_vulnerabilities: usize,
    pub offline_files: usize,
    pub failed_files: usize,
}

#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub path: String,
    pub summary: ScanSummary,
    pub files: Vec<FileReport>,
}

impl ScanReport {
    fn new(path: String, files: Vec<FileReport>) -> Self {
        let mut summary = ScanSummary {
            files: files.len(),
            ..ScanSummary::default()
        };
        for file in &files {
            summary.dependencies += file.dependencies;
            summary.affected_dependencies += file.affected;
            summary.known_vulnerabilities += file.known_vulnerabilities;
            match file.status {
                FileStatus::Audit(AuditStatus::Offline | AuditStatus::Unavailable) => {
                    summary.offline_files += 1;
                }
                FileStatus::Failed => summary.failed_files += 1,
                FileStatus::Audit(_) => {}
            }
        }
        Self {
            path,
            summary,
            files,
        }
    }
}

impl Render for ScanReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.files.is_empty() {
            return writeln!(w, "No manifests found under {}.", self.path);
        }
        for file in &self.files {
            writeln!(w, "{} [{}] {}", file.path, file.status, file.severity)?;
            if let Some(ref error) = file.error {
                writeln!(w, "  {error}")?;
            }
            for finding in &file.findings {
                let label = match finding.severity {
                    FindingSeverity::Error => "ERROR",
                    FindingSeverity::Info => "INFO",
                    FindingSeverity::None => "-",
                };
                let scope = if finding.root { "" } else { " (transitive)" };
                writeln!(
                    w,
                    "  {:<6} {} {}{} (line {})",
                    label, finding.name, finding.version, scope, finding.line
                )?;
                for vuln in &finding.vulnerabilities {
                    writeln!(w, "         {} {} [{}]", vuln.id, vuln.title, vuln.severity)?;
                }
            }
        }
        writeln!(w)?;
        let s = &self.summary;
        writeln!(
            w,
            "{} files, {} dependencies, {} affected, {} known vulnerabilities",
            s.files, s.dependencies, s.affected_dependencies, s.known_vulnerabilities
        )?;
        if s.offline_files > 0 {
            writeln!(w, "{} files served offline (index unreachable)", s.offline_files)?;
        }
        if s.failed_files > 0 {
            writeln!(w, "{} files could not be audited", s.failed_files)?;
        }
        Ok(())
    }
}
