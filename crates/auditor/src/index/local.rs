//! 로컬 인덱스 스냅샷 -- JSON 파일에서 로드한 인덱스 데이터
//!
//! [`LocalIndex`]는 원격 인덱스와 같은 [`VulnerabilityIndex`] 계약을 로컬 데이터로 제공합니다.
//! 네트워크 없이 감사하거나, 파이프라인을 결정적으로 재현할 때 사용합니다.
//!
//! # JSON 형식
//!
//! ```json
//! {
//!   "artifacts": [
//!     { "id": 1, "ecosystem": "npm", "package_name": "lodash", "version": "4.17.21",
//!       "scm_id": 101, "dependencies": [2] }
//!   ],
//!   "scms": [ { "id": 101, "name": "lodash/lodash", "vulnerability_ids": ["V-1"] } ],
//!   "vulnerabilities": [
//!     { "scm_id": 101, "id": "V-1", "title": "Prototype pollution",
//!       "affects": { "package": "lodash", "ranges": [{ "fixed": "4.17.12" }] } }
//!   ]
//! }
//! ```
//!
//! 디렉토리를 지정하면 그 안의 모든 `*.json` 파일을 합칩니다.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::VulnerabilityIndex;
use crate::error::AuditorError;
use crate::types::{ArtifactRef, Ecosystem, PackageRef, ScmRef, VulnerabilityRecord};

/// 스냅샷 파일 최대 크기 (50 MB)
const MAX_SNAPSHOT_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// 전체 레코드 최대 개수
const MAX_SNAPSHOT_RECORDS: usize = 1_000_000;

/// 스냅샷의 아티팩트 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotArtifact {
    pub ecosystem: Ecosystem,
    #[serde(flatten)]
    pub artifact: ArtifactRef,
    /// 직접 의존하는 아티팩트 id
    #[serde(default)]
    pub dependencies: Vec<i64>,
}

/// 스냅샷의 취약점 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotVulnerability {
    pub scm_id: i64,
    #[serde(flatten)]
    pub record: VulnerabilityRecord,
}

/// 인덱스 스냅샷
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSnapshot {
    #[serde(default)]
    pub artifacts: Vec<SnapshotArtifact>,
    #[serde(default)]
    pub scms: Vec<ScmRef>,
    #[serde(default)]
    pub vulnerabilities: Vec<SnapshotVulnerability>,
}

impl IndexSnapshot {
    fn record_count(&self) -> usize {
        self.artifacts.len() + self.scms.len() + self.vulnerabilities.len()
    }

    fn merge(&mut self, other: IndexSnapshot) {
        self.artifacts.extend(other.artifacts);
        self.scms.extend(other.scms);
        self.vulnerabilities.extend(other.vulnerabilities);
    }
}

/// 호출 종류별 횟수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexCalls {
    pub artifacts: usize,
    pub graph: usize,
    pub scms: usize,
    pub vulnerabilities: usize,
}

impl IndexCalls {
    pub fn total(&self) -> usize {
        self.artifacts + self.graph + self.scms + self.vulnerabilities
    }
}

#[derive(Default)]
struct CallCounters {
    artifacts: AtomicUsize,
    graph: AtomicUsize,
    scms: AtomicUsize,
    vulnerabilities: AtomicUsize,
}

/// 로컬 인덱스
pub struct LocalIndex {
    artifacts: Vec<SnapshotArtifact>,
    by_id: HashMap<i64, usize>,
    by_name: HashMap<(Ecosystem, String), Vec<usize>>,
    scms: HashMap<i64, ScmRef>,
    vulnerabilities: HashMap<i64, Vec<VulnerabilityRecord>>,
    calls: CallCounters,
    artifact_requests: Mutex<Vec<Vec<PackageRef>>>,
    unreachable: AtomicBool,
}

impl LocalIndex {
    /// 스냅샷으로 인덱스를 생성합니다.
    pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        let mut by_id = HashMap::new();
        let mut by_name: HashMap<(Ecosystem, String), Vec<usize>> = HashMap::new();
        for (idx, entry) in snapshot.artifacts.iter().enumerate() {
            by_id.insert(entry.artifact.id, idx);
            by_name
                .entry((entry.ecosystem, entry.artifact.package_name.clone()))
                .or_default()
                .push(idx);
        }

        let scms = snapshot.scms.into_iter().map(|s| (s.id, s)).collect();

        let mut vulnerabilities: HashMap<i64, Vec<VulnerabilityRecord>> = HashMap::new();
        for v in snapshot.vulnerabilities {
            vulnerabilities.entry(v.scm_id).or_default().push(v.record);
        }

        Self {
            artifacts: snapshot.artifacts,
            by_id,
            by_name,
            scms,
            vulnerabilities,
            calls: CallCounters::default(),
            artifact_requests: Mutex::new(Vec::new()),
            unreachable: AtomicBool::new(false),
        }
    }

    /// 빈 인덱스
    pub fn empty() -> Self {
        Self::from_snapshot(IndexSnapshot::default())
    }

    /// JSON 문자열에서 인덱스를 파싱합니다.
    pub fn from_json(json: &str) -> Result<Self, AuditorError> {
        let snapshot: IndexSnapshot = serde_json::from_str(json)
            .map_err(|e| AuditorError::Index(format!("failed to parse index snapshot: {e}")))?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// 파일 또는 디렉토리에서 스냅샷을 로드합니다.
    ///
    /// # Note
    ///
    /// 동기 I/O를 수행합니다. async 컨텍스트에서는
    /// `tokio::task::spawn_blocking`으로 감싸세요.
    pub fn load(path: &Path) -> Result<Self, AuditorError> {
        let files = if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|e| AuditorError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            let mut files: Vec<_> = entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        let mut snapshot = IndexSnapshot::default();
        for file in &files {
            let metadata = std::fs::metadata(file).map_err(|e| AuditorError::Io {
                path: file.display().to_string(),
                source: e,
            })?;
            if metadata.len() > MAX_SNAPSHOT_FILE_SIZE {
                return Err(AuditorError::FileTooBig {
                    path: file.display().to_string(),
                    size: usize::try_from(metadata.len()).unwrap_or(usize::MAX),
                    max: usize::try_from(MAX_SNAPSHOT_FILE_SIZE).unwrap_or(usize::MAX),
                });
            }
            let content = std::fs::read_to_string(file).map_err(|e| AuditorError::Io {
                path: file.display().to_string(),
                source: e,
            })?;
            let part: IndexSnapshot = serde_json::from_str(&content).map_err(|e| {
                AuditorError::Index(format!("failed to parse {}: {e}", file.display()))
            })?;
            if snapshot.record_count() + part.record_count() > MAX_SNAPSHOT_RECORDS {
                return Err(AuditorError::Index(format!(
                    "index snapshot exceeds {MAX_SNAPSHOT_RECORDS} records"
                )));
            }
            debug!(path = %file.display(), records = part.record_count(), "loaded index snapshot file");
            snapshot.merge(part);
        }

        info!(
            artifacts = snapshot.artifacts.len(),
            scms = snapshot.scms.len(),
            vulnerabilities = snapshot.vulnerabilities.len(),
            "local index loaded"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// 지금까지의 호출 횟수
    pub fn call_counts(&self) -> IndexCalls {
        IndexCalls {
            artifacts: self.calls.artifacts.load(Ordering::SeqCst),
            graph: self.calls.graph.load(Ordering::SeqCst),
            scms: self.calls.scms.load(Ordering::SeqCst),
            vulnerabilities: self.calls.vulnerabilities.load(Ordering::SeqCst),
        }
    }

    /// `find_artifacts`에 전달된 요청 목록 (호출 순)
    pub fn artifact_requests(&self) -> Vec<Vec<PackageRef>> {
        self.artifact_requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// 도달 불가 상태를 흉내냅니다. 이후 모든 호출이 연결 에러를 반환합니다.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn enter(&self, counter: &AtomicUsize, call: &str) -> Result<(), AuditorError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AuditorError::connectivity(
                format!("local:{call}"),
                "index marked unreachable",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl VulnerabilityIndex for LocalIndex {
    async fn find_artifacts(
        &self,
        packages: &[PackageRef],
    ) -> Result<Vec<Vec<ArtifactRef>>, AuditorError> {
        self.enter(&self.calls.artifacts, "find_artifacts")?;
        if let Ok(mut requests) = self.artifact_requests.lock() {
            requests.push(packages.to_vec());
        }
        Ok(packages
            .iter()
            .map(|p| {
                self.by_name
                    .get(&(p.ecosystem, p.name.clone()))
                    .map(|idxs| {
                        idxs.iter()
                            .map(|i| self.artifacts[*i].artifact.clone())
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect())
    }

    async fn dependency_graph(&self, root: &ArtifactRef) -> Result<Vec<ArtifactRef>, AuditorError> {
        self.enter(&self.calls.graph, "dependency_graph")?;
        let mut out = Vec::new();
        // 공유 의존성은 경로마다 다시 나타나고, 조상으로 되돌아가는 간선만 끊음
        let mut path: Vec<i64> = Vec::new();
        let mut stack = vec![(root.id, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            path.truncate(depth);
            if path.contains(&id) {
                continue;
            }
            let Some(&idx) = self.by_id.get(&id) else {
                continue;
            };
            let entry = &self.artifacts[idx];
            out.push(entry.artifact.clone());
            path.push(id);
            // 선언 순서대로 방문하도록 역순으로 push
            stack.extend(entry.dependencies.iter().rev().map(|&dep| (dep, depth + 1)));
        }
        Ok(out)
    }

    async fn find_scms(&self, ids: &[i64]) -> Result<Vec<ScmRef>, AuditorError> {
        self.enter(&self.calls.scms, "find_scms")?;
        Ok(ids.iter().filter_map(|id| self.scms.get(id).cloned()).collect())
    }

    async fn find_vulnerabilities(
        &self,
        scm: &ScmRef,
    ) -> Result<Vec<VulnerabilityRecord>, AuditorError> {
        self.enter(&self.calls.vulnerabilities, "find_vulnerabilities")?;
        Ok(self.vulnerabilities.get(&scm.id).cloned().unwrap_or_default())
    }
}
