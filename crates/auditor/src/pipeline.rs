//! 파일 단위 감사 파이프라인
//!
//! 매니페스트 하나에 대해 다음 단계를 순서대로 수행합니다.
//!
//! ```text
//! 읽기(크기 제한) → ManifestReader → ArtifactResolver → DependencyGraphExpander
//!   → ScmCorrelator → VulnerabilityJoiner → FindingEmitter
//! ```
//!
//! 원격 작업이 모두 끝난 뒤에 `Clear`와 finding을 한꺼번에 발행합니다.
//! 중간에 연결이 끊기면 아무것도 발행하지 않으므로 리스너의 이전 결과가 유지됩니다.
//! 인덱스가 저장된 응답으로 대신 답했다면 결과에 `served_offline`이 표시됩니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use depwatch_core::metrics as m;

use crate::cache::Clock;
use crate::emitter::FindingEmitter;
use crate::error::AuditorError;
use crate::graph::DependencyGraphExpander;
use crate::index::VulnerabilityIndex;
use crate::manifest::ReaderRegistry;
use crate::resolver::ArtifactResolver;
use crate::scm::ScmCorrelator;
use crate::types::{ArtifactRef, DependencyEvent, FileAudit, PackageDependency};
use crate::vuln::VulnerabilityJoiner;

/// 매니페스트 감사 파이프라인
pub struct AuditPipeline {
    index: Arc<dyn VulnerabilityIndex>,
    registry: Arc<ReaderRegistry>,
    resolver: ArtifactResolver,
    expander: DependencyGraphExpander,
    correlator: ScmCorrelator,
    emitter: Arc<FindingEmitter>,
    clock: Arc<dyn Clock>,
    max_file_size: usize,
}

impl AuditPipeline {
    pub fn new(
        index: Arc<dyn VulnerabilityIndex>,
        registry: Arc<ReaderRegistry>,
        emitter: Arc<FindingEmitter>,
        clock: Arc<dyn Clock>,
        max_file_size: usize,
    ) -> Self {
        Self {
            resolver: ArtifactResolver::new(Arc::clone(&index)),
            expander: DependencyGraphExpander::new(Arc::clone(&index)),
            correlator: ScmCorrelator::new(Arc::clone(&index)),
            index,
            registry,
            emitter,
            clock,
            max_file_size,
        }
    }

    pub fn emitter(&self) -> &Arc<FindingEmitter> {
        &self.emitter
    }

    pub fn registry(&self) -> &Arc<ReaderRegistry> {
        &self.registry
    }

    /// 등록된 리더가 처리할 수 있는 파일인지 여부
    pub fn accepts(&self, path: &Path) -> bool {
        self.registry.accepts(path)
    }

    /// 매니페스트 하나를 감사하고 finding을 발행합니다.
    ///
    /// # Errors
    ///
    /// - `AuditorError::Connectivity`: 원격 인덱스 연결 실패 (아무것도 발행하지 않음)
    /// - `AuditorError::Index` / `AuditorError::ProtocolMismatch`: 아티팩트 배치 조회 실패
    /// - `AuditorError::ManifestParse`: 리더가 없거나 파일을 파싱할 수 없음
    /// - `AuditorError::FileTooBig` / `AuditorError::Io`: 파일 읽기 실패
    pub async fn audit_file(&self, path: &Path) -> Result<FileAudit, AuditorError> {
        let started = Instant::now();
        let reader = self
            .registry
            .reader_for(path)
            .ok_or_else(|| AuditorError::ManifestParse {
                path: path.display().to_string(),
                reason: "no manifest reader accepts this file".to_owned(),
            })?;
        let ecosystem = reader.ecosystem();
        let eco_label = ecosystem.to_string();

        let fallbacks_before = self.index.fallback_responses();
        let result = self.run_pass(path, reader.as_ref()).await;
        // 동시 실행 중인 다른 패스의 대체 응답도 잡힐 수 있음 (오프라인 쪽으로만 틀림)
        let served_offline = self.index.fallback_responses() > fallbacks_before;

        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(m::AUDIT_FILES_TOTAL, m::LABEL_ECOSYSTEM => eco_label.clone(), m::LABEL_RESULT => outcome)
            .increment(1);
        metrics::histogram!(m::AUDIT_DURATION_SECONDS, m::LABEL_ECOSYSTEM => eco_label)
            .record(started.elapsed().as_secs_f64());

        let (source_file, findings) = result?;
        let audit = FileAudit {
            source_file,
            ecosystem,
            findings,
            audited_at_ms: self.clock.now_ms(),
            served_offline,
        };
        for finding in &audit.findings {
            metrics::counter!(m::AUDIT_FINDINGS_TOTAL, m::LABEL_SEVERITY => finding.severity.to_string())
                .increment(1);
        }
        info!(
            source = %audit.source_file,
            dependencies = audit.dependency_count(),
            vulnerabilities = audit.vulnerability_count(),
            severity = %audit.severity(),
            served_offline,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "manifest audited"
        );
        Ok(audit)
    }

    async fn run_pass(
        &self,
        path: &Path,
        reader: &dyn crate::manifest::ManifestReader,
    ) -> Result<(String, Vec<crate::types::Finding>), AuditorError> {
        let content = read_manifest(path.to_path_buf(), self.max_file_size).await?;
        let events = reader.run(path, &content)?;

        let mut source_file = path.display().to_string();
        let mut roots = Vec::new();
        for event in events {
            match event {
                DependencyEvent::Clear { source_file: s } => source_file = s,
                DependencyEvent::Add(dep) => roots.push(dep),
            }
        }

        // 아티팩트 배치가 실패하면 파일 전체가 실패. 미해석 결과를 fresh로 남기지 않음
        let resolved = self
            .resolver
            .resolve(&source_file, &roots)
            .await
            .inspect_err(|e| warn!(source = %source_file, error = %e, "artifact resolution failed"))?;

        let mut deps: Vec<PackageDependency> = Vec::with_capacity(roots.len());
        for mut root in roots {
            root.resolved_artifact = resolved.get(&root.name).cloned().flatten();
            deps.extend(self.expand(&source_file, root).await?);
        }

        match self.correlator.correlate(&mut deps).await {
            Ok(report) => debug!(
                source = %source_file,
                queried = report.queried,
                reused = report.reused,
                skipped = report.skipped,
                "scm correlation"
            ),
            Err(e) if e.is_connectivity() => return Err(e),
            Err(e) => warn!(source = %source_file, error = %e, "scm correlation abandoned for this pass"),
        }

        let joiner = VulnerabilityJoiner::new(Arc::clone(&self.index));
        let mut joined = Vec::with_capacity(deps.len());
        for dep in &deps {
            let vulns = match joiner.join(dep).await {
                Ok(vulns) => vulns,
                Err(e) if e.is_connectivity() => return Err(e),
                Err(e) => {
                    warn!(source = %source_file, package = %dep.name, error = %e, "vulnerability lookup failed");
                    Vec::new()
                }
            };
            joined.push(vulns);
        }

        self.emitter.clear(&source_file);
        let findings = deps
            .into_iter()
            .zip(joined)
            .map(|(dep, vulns)| self.emitter.emit(&source_file, dep, vulns))
            .collect();
        Ok((source_file, findings))
    }

    async fn expand(
        &self,
        source_file: &str,
        root: PackageDependency,
    ) -> Result<Vec<PackageDependency>, AuditorError> {
        match self.expander.expand(&root).await {
            Ok(expanded) => Ok(expanded),
            Err(e) if e.is_connectivity() => Err(e),
            Err(e) => {
                warn!(source = source_file, package = %root.name, artifact = ?root.resolved_artifact.as_ref().map(ArtifactRef::to_string), error = %e, "dependency graph unavailable");
                Ok(vec![root])
            }
        }
    }
}

/// 크기 제한을 확인하고 매니페스트를 읽습니다.
async fn read_manifest(path: PathBuf, max_file_size: usize) -> Result<String, AuditorError> {
    tokio::task::spawn_blocking(move || {
        let display = path.display().to_string();
        let meta = std::fs::metadata(&path).map_err(|e| AuditorError::Io {
            path: display.clone(),
            source: e,
        })?;
        let size = usize::try_from(meta.len()).unwrap_or(usize::MAX);
        if size > max_file_size {
            return Err(AuditorError::FileTooBig {
                path: display,
                size,
                max: max_file_size,
            });
        }
        std::fs::read_to_string(&path).map_err(|e| AuditorError::Io {
            path: display,
            source: e,
        })
    })
    .await
    .map_err(|e| AuditorError::Channel(format!("spawn_blocking failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::emitter::MarkerSink;
    use crate::index::LocalIndex;
    use crate::manifest::ReaderOptions;
    use crate::types::{FindingSeverity, MarkerKind, ScmLookup};

    const SNAPSHOT: &str = r#"{
  "artifacts": [
    { "id": 1, "ecosystem": "npm", "package_name": "lodash", "version": "4.17.4", "scm_id": 101 },
    { "id": 2, "ecosystem": "npm", "package_name": "express", "version": "4.18.2", "scm_id": 205, "dependencies": [3] },
    { "id": 3, "ecosystem": "npm", "package_name": "qs", "version": "6.11.0", "scm_id": -1 }
  ],
  "scms": [
    { "id": 101, "name": "lodash/lodash" },
    { "id": 205, "name": "expressjs/express" }
  ],
  "vulnerabilities": [
    { "scm_id": 101, "id": "V-1", "title": "Prototype pollution",
      "affects": { "package": "lodash", "ranges": [{ "fixed": "4.17.12" }] } }
  ]
}"#;

    const PACKAGE_JSON: &str = r#"{
  "name": "demo",
  "dependencies": {
    "lodash": "^4.17.0",
    "express": "~4.18.0",
    "left-pad": "file:../left-pad"
  }
}"#;

    struct Fixture {
        _dir: tempfile::TempDir,
        path: PathBuf,
        index: Arc<LocalIndex>,
        sink: Arc<MarkerSink>,
        pipeline: AuditPipeline,
    }

    fn fixture(max_file_size: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("package.json");
        std::fs::write(&path, PACKAGE_JSON).unwrap();

        let index = Arc::new(LocalIndex::from_json(SNAPSHOT).unwrap());
        let emitter = Arc::new(FindingEmitter::new());
        let sink = Arc::new(MarkerSink::new());
        emitter.add_listener(sink.clone());
        let pipeline = AuditPipeline::new(
            index.clone(),
            Arc::new(ReaderRegistry::with_defaults(ReaderOptions::default())),
            emitter,
            Arc::new(ManualClock::new(1_000)),
            max_file_size,
        );
        Fixture {
            _dir: dir,
            path,
            index,
            sink,
            pipeline,
        }
    }

    #[tokio::test]
    async fn audits_resolves_expands_and_classifies() {
        let f = fixture(1024 * 1024);
        let audit = f.pipeline.audit_file(&f.path).await.unwrap();

        let names: Vec<&str> = audit
            .findings
            .iter()
            .map(|x| x.dependency.name.as_str())
            .collect();
        assert_eq!(names, vec!["lodash", "express", "qs", "left-pad"]);
        assert_eq!(audit.audited_at_ms, 1_000);
        assert_eq!(audit.severity(), FindingSeverity::Error);

        let lodash = &audit.findings[0];
        assert_eq!(lodash.severity, FindingSeverity::Error);
        assert_eq!(lodash.dependency.scm_lookup, ScmLookup::Attached);

        let qs = &audit.findings[2];
        assert!(!qs.dependency.is_root);
        assert_eq!(qs.dependency.scm_lookup, ScmLookup::Skipped);
        assert_eq!(qs.position, audit.findings[1].position);

        let left_pad = &audit.findings[3];
        assert!(left_pad.dependency.resolved_artifact.is_none());
        assert_eq!(left_pad.severity, FindingSeverity::None);
    }

    #[tokio::test]
    async fn every_resolved_dependency_has_recorded_scm_lookup() {
        let f = fixture(1024 * 1024);
        let audit = f.pipeline.audit_file(&f.path).await.unwrap();
        for finding in &audit.findings {
            if finding.dependency.is_resolved() {
                assert_ne!(finding.dependency.scm_lookup, ScmLookup::NotAttempted);
            }
        }
    }

    #[tokio::test]
    async fn markers_reach_listeners_and_are_replaced_on_rerun() {
        let f = fixture(1024 * 1024);
        let first = f.pipeline.audit_file(&f.path).await.unwrap();
        let source = first.source_file.clone();
        let markers = f.sink.markers(&source);
        assert_eq!(markers[0].kind, MarkerKind::RootDependency);
        assert!(markers.iter().any(|m| m.kind == MarkerKind::Vulnerability));

        let second = f.pipeline.audit_file(&f.path).await.unwrap();
        assert_eq!(first.findings, second.findings);
        assert_eq!(f.sink.markers(&source), markers);
    }

    #[tokio::test]
    async fn connectivity_failure_emits_nothing() {
        let f = fixture(1024 * 1024);
        f.index.set_unreachable(true);
        let err = f.pipeline.audit_file(&f.path).await.unwrap_err();
        assert!(err.is_connectivity());
        assert!(f.sink.files().is_empty());
    }

    #[tokio::test]
    async fn oversized_manifest_is_rejected() {
        let f = fixture(16);
        let err = f.pipeline.audit_file(&f.path).await.unwrap_err();
        assert!(matches!(err, AuditorError::FileTooBig { max: 16, .. }));
        assert_eq!(f.index.call_counts().total(), 0);
    }

    #[tokio::test]
    async fn unknown_file_has_no_reader() {
        let f = fixture(1024);
        let err = f
            .pipeline
            .audit_file(Path::new("Cargo.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditorError::ManifestParse { .. }));
    }

    /// 아티팩트 배치만 거부하는 인덱스
    struct RejectingIndex(Arc<LocalIndex>);

    #[async_trait::async_trait]
    impl VulnerabilityIndex for RejectingIndex {
        async fn find_artifacts(
            &self,
            _packages: &[crate::types::PackageRef],
        ) -> Result<Vec<Vec<ArtifactRef>>, AuditorError> {
            Err(AuditorError::Index("artifact search returned 500".to_owned()))
        }

        async fn dependency_graph(&self, root: &ArtifactRef) -> Result<Vec<ArtifactRef>, AuditorError> {
            self.0.dependency_graph(root).await
        }

        async fn find_scms(&self, ids: &[i64]) -> Result<Vec<crate::types::ScmRef>, AuditorError> {
            self.0.find_scms(ids).await
        }

        async fn find_vulnerabilities(
            &self,
            scm: &crate::types::ScmRef,
        ) -> Result<Vec<crate::types::VulnerabilityRecord>, AuditorError> {
            self.0.find_vulnerabilities(scm).await
        }
    }

    #[tokio::test]
    async fn failed_artifact_batch_fails_the_file() {
        let f = fixture(1024 * 1024);
        let emitter = Arc::new(FindingEmitter::new());
        let sink = Arc::new(MarkerSink::new());
        emitter.add_listener(sink.clone());
        let pipeline = AuditPipeline::new(
            Arc::new(RejectingIndex(f.index.clone())),
            Arc::new(ReaderRegistry::with_defaults(ReaderOptions::default())),
            emitter,
            Arc::new(ManualClock::new(1_000)),
            1024 * 1024,
        );

        let err = pipeline.audit_file(&f.path).await.unwrap_err();
        assert!(matches!(err, AuditorError::Index(_)));
        assert!(!err.is_connectivity());
        assert!(sink.markers(&f.path.display().to_string()).is_empty());
        assert_eq!(f.index.call_counts().graph, 0);
    }
}
