//! 통합 테스트 공용 헬퍼

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use depwatch_auditor::error::AuditorError;
use depwatch_auditor::index::{LocalIndex, VulnerabilityIndex};
use depwatch_auditor::types::{ArtifactRef, PackageRef, ScmRef, VulnerabilityRecord};

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// fixtures/index.json 스냅샷
pub fn fixture_index() -> Arc<LocalIndex> {
    Arc::new(LocalIndex::load(&fixture_path("index.json")).unwrap())
}

/// 프로젝트 fixture를 임시 디렉토리로 복사합니다.
pub fn copy_project() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("project");
    std::fs::create_dir_all(&root).unwrap();
    for name in ["package.json", "pom.xml"] {
        std::fs::copy(fixture_path("project").join(name), root.join(name)).unwrap();
    }
    (dir, root)
}

/// SCM 배치 응답에서 마지막 레코드를 빠뜨리는 인덱스
pub struct TruncatingIndex {
    pub inner: Arc<LocalIndex>,
    pub scm_batches: AtomicUsize,
}

impl TruncatingIndex {
    pub fn new(inner: Arc<LocalIndex>) -> Self {
        Self {
            inner,
            scm_batches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VulnerabilityIndex for TruncatingIndex {
    async fn find_artifacts(
        &self,
        packages: &[PackageRef],
    ) -> Result<Vec<Vec<ArtifactRef>>, AuditorError> {
        self.inner.find_artifacts(packages).await
    }

    async fn dependency_graph(&self, root: &ArtifactRef) -> Result<Vec<ArtifactRef>, AuditorError> {
        self.inner.dependency_graph(root).await
    }

    async fn find_scms(&self, ids: &[i64]) -> Result<Vec<ScmRef>, AuditorError> {
        self.scm_batches.fetch_add(1, Ordering::SeqCst);
        let mut scms = self.inner.find_scms(ids).await?;
        scms.pop();
        Ok(scms)
    }

    async fn find_vulnerabilities(
        &self,
        scm: &ScmRef,
    ) -> Result<Vec<VulnerabilityRecord>, AuditorError> {
        self.inner.find_vulnerabilities(scm).await
    }
}

/// 켜져 있는 동안 아티팩트 배치를 `Index` 에러로 거부하는 인덱스
pub struct FailingArtifactsIndex {
    pub inner: Arc<LocalIndex>,
    pub failing: AtomicBool,
}

impl FailingArtifactsIndex {
    pub fn new(inner: Arc<LocalIndex>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl VulnerabilityIndex for FailingArtifactsIndex {
    async fn find_artifacts(
        &self,
        packages: &[PackageRef],
    ) -> Result<Vec<Vec<ArtifactRef>>, AuditorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditorError::Index("artifact search returned 500".to_owned()));
        }
        self.inner.find_artifacts(packages).await
    }

    async fn dependency_graph(&self, root: &ArtifactRef) -> Result<Vec<ArtifactRef>, AuditorError> {
        self.inner.dependency_graph(root).await
    }

    async fn find_scms(&self, ids: &[i64]) -> Result<Vec<ScmRef>, AuditorError> {
        self.inner.find_scms(ids).await
    }

    async fn find_vulnerabilities(
        &self,
        scm: &ScmRef,
    ) -> Result<Vec<VulnerabilityRecord>, AuditorError> {
        self.inner.find_vulnerabilities(scm).await
    }
}
