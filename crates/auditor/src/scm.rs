//! SCM 상관 분석 -- 해석된 아티팩트에 소스 저장소 레코드 연결
//!
//! 양수 scm id를 가진 아티팩트만 조회합니다. 같은 저장소를 가리키는 모든 의존성은
//! 하나의 `Arc<ScmRef>`를 공유하고, 상관 분석기는 `Weak` 참조만 보관하므로
//! 살아 있는 의존성이 없어진 레코드는 다음 패스에서 다시 조회됩니다.
//!
//! 배치 응답이 요청과 위치로 대응하지 않으면(개수 또는 id 불일치) 그 배치의
//! 어떤 레코드도 연결하지 않고, 해당 의존성의 조회를 `Abandoned`로 기록합니다.
//! 같은 패스 안에서는 재시도하지 않습니다.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, warn};

use depwatch_core::metrics as m;

use crate::error::AuditorError;
use crate::index::{CALL_SCMS, VulnerabilityIndex};
use crate::types::{PackageDependency, ScmLookup, ScmRef};

/// 상관 분석 한 번의 결과 요약
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationReport {
    /// 원격으로 조회한 고유 scm id 수
    pub queried: usize,
    /// 약한 캐시에서 재사용한 의존성 수
    pub reused: usize,
    /// scm id가 없어 건너뛴 의존성 수
    pub skipped: usize,
}

/// SCM 상관 분석기
pub struct ScmCorrelator {
    index: Arc<dyn VulnerabilityIndex>,
    known: Mutex<HashMap<i64, Weak<ScmRef>>>,
}

impl ScmCorrelator {
    pub fn new(index: Arc<dyn VulnerabilityIndex>) -> Self {
        Self {
            index,
            known: Mutex::new(HashMap::new()),
        }
    }

    /// 아직 살아 있는 캐시 항목 수
    pub fn live_entries(&self) -> usize {
        self.known
            .lock()
            .map(|known| known.values().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// 의존성 목록에 SCM 레코드를 연결합니다.
    ///
    /// 해석된 아티팩트가 없는 의존성은 건드리지 않습니다.
    ///
    /// # Errors
    ///
    /// - `AuditorError::Connectivity`: 원격 호출 실패 (조회 상태는 `NotAttempted` 유지)
    /// - `AuditorError::ProtocolMismatch`: 배치 응답이 요청과 대응하지 않음
    pub async fn correlate(
        &self,
        deps: &mut [PackageDependency],
    ) -> Result<CorrelationReport, AuditorError> {
        let mut report = CorrelationReport::default();
        let mut missing: Vec<i64> = Vec::new();

        {
            let mut known = self
                .known
                .lock()
                .map_err(|e| AuditorError::Channel(format!("scm cache lock poisoned: {e}")))?;
            known.retain(|_, weak| weak.strong_count() > 0);

            for dep in deps.iter_mut() {
                let Some(artifact) = dep.resolved_artifact.as_ref() else {
                    continue;
                };
                let Some(scm_id) = artifact.queryable_scm_id() else {
                    dep.scm_lookup = ScmLookup::Skipped;
                    report.skipped += 1;
                    continue;
                };
                if let Some(scm) = known.get(&scm_id).and_then(Weak::upgrade) {
                    dep.resolved_scm = Some(scm);
                    dep.scm_lookup = ScmLookup::Attached;
                    report.reused += 1;
                } else if !missing.contains(&scm_id) {
                    missing.push(scm_id);
                }
            }
        }

        if missing.is_empty() {
            return Ok(report);
        }

        let fetched = self.index.find_scms(&missing).await?;
        let aligned = fetched.len() == missing.len()
            && fetched.iter().zip(&missing).all(|(scm, id)| scm.id == *id);
        if !aligned {
            metrics::counter!(m::INDEX_PROTOCOL_MISMATCHES_TOTAL).increment(1);
            warn!(
                requested = ?missing,
                received = ?fetched.iter().map(|s| s.id).collect::<Vec<_>>(),
                "scm lookup response does not match request, abandoning batch"
            );
            for dep in deps.iter_mut() {
                let pending = dep
                    .resolved_artifact
                    .as_ref()
                    .and_then(|a| a.queryable_scm_id())
                    .is_some_and(|id| missing.contains(&id));
                if pending {
                    dep.scm_lookup = ScmLookup::Abandoned;
                }
            }
            return Err(AuditorError::ProtocolMismatch {
                call: CALL_SCMS.to_owned(),
                expected: missing.len(),
                actual: fetched.len(),
            });
        }

        report.queried = missing.len();
        let shared: HashMap<i64, Arc<ScmRef>> = fetched
            .into_iter()
            .map(|scm| (scm.id, Arc::new(scm)))
            .collect();

        {
            let mut known = self
                .known
                .lock()
                .map_err(|e| AuditorError::Channel(format!("scm cache lock poisoned: {e}")))?;
            for (id, scm) in &shared {
                known.insert(*id, Arc::downgrade(scm));
            }
        }

        for dep in deps.iter_mut() {
            let scm = dep
                .resolved_artifact
                .as_ref()
                .and_then(|a| a.queryable_scm_id())
                .and_then(|id| shared.get(&id));
            if let Some(scm) = scm {
                dep.resolved_scm = Some(Arc::clone(scm));
                dep.scm_lookup = ScmLookup::Attached;
            }
        }

        debug!(
            queried = report.queried,
            reused = report.reused,
            skipped = report.skipped,
            "scm correlation completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::LocalIndex;
    use crate::types::{ArtifactRef, Ecosystem, SourcePosition};

    const SNAPSHOT: &str = r#"{
  "scms": [
    { "id": 101, "name": "lodash/lodash" },
    { "id": 205, "name": "expressjs/express" }
  ]
}"#;

    fn dep(name: &str, scm_id: Option<i64>) -> PackageDependency {
        let mut dep =
            PackageDependency::declared(Ecosystem::Npm, name, "1.0.0", SourcePosition::default(), false);
        dep.resolved_artifact = Some(ArtifactRef {
            id: 1,
            package_name: name.into(),
            version: "1.0.0".into(),
            scm_id,
            dependency_graph: None,
        });
        dep
    }

    fn correlator(json: &str) -> (ScmCorrelator, Arc<LocalIndex>) {
        let index = Arc::new(LocalIndex::from_json(json).unwrap());
        (
            ScmCorrelator::new(Arc::clone(&index) as Arc<dyn VulnerabilityIndex>),
            index,
        )
    }

    #[tokio::test]
    async fn non_positive_and_absent_ids_are_skipped() {
        let (correlator, index) = correlator(SNAPSHOT);
        let mut deps = vec![dep("a", None), dep("b", Some(0)), dep("c", Some(-4))];
        let report = correlator.correlate(&mut deps).await.unwrap();
        assert_eq!(report.skipped, 3);
        assert!(deps.iter().all(|d| d.scm_lookup == ScmLookup::Skipped));
        assert_eq!(index.call_counts().scms, 0);
    }

    #[tokio::test]
    async fn unresolved_dependencies_are_untouched() {
        let (correlator, _) = correlator(SNAPSHOT);
        let mut deps = vec![PackageDependency::declared(
            Ecosystem::Npm,
            "left-pad",
            "file:../x",
            SourcePosition::default(),
            false,
        )];
        correlator.correlate(&mut deps).await.unwrap();
        assert_eq!(deps[0].scm_lookup, ScmLookup::NotAttempted);
    }

    #[tokio::test]
    async fn shared_scm_is_one_allocation() {
        let (correlator, index) = correlator(SNAPSHOT);
        let mut deps = vec![dep("lodash", Some(101)), dep("lodash.merge", Some(101)), dep("express", Some(205))];
        let report = correlator.correlate(&mut deps).await.unwrap();
        assert_eq!(report.queried, 2);
        assert_eq!(index.call_counts().scms, 1);
        let a = deps[0].resolved_scm.as_ref().unwrap();
        let b = deps[1].resolved_scm.as_ref().unwrap();
        assert!(Arc::ptr_eq(a, b));
        assert_eq!(deps[2].resolved_scm.as_ref().unwrap().name, "expressjs/express");
    }

    #[tokio::test]
    async fn live_weak_entries_are_reused_without_remote_call() {
        let (correlator, index) = correlator(SNAPSHOT);
        let mut first = vec![dep("lodash", Some(101))];
        correlator.correlate(&mut first).await.unwrap();

        let mut second = vec![dep("lodash", Some(101))];
        let report = correlator.correlate(&mut second).await.unwrap();
        assert_eq!(report.reused, 1);
        assert_eq!(index.call_counts().scms, 1);
        assert!(Arc::ptr_eq(
            first[0].resolved_scm.as_ref().unwrap(),
            second[0].resolved_scm.as_ref().unwrap()
        ));
    }

    #[tokio::test]
    async fn dropped_records_are_fetched_again() {
        let (correlator, index) = correlator(SNAPSHOT);
        let mut first = vec![dep("lodash", Some(101))];
        correlator.correlate(&mut first).await.unwrap();
        drop(first);
        assert_eq!(correlator.live_entries(), 0);

        let mut second = vec![dep("lodash", Some(101))];
        correlator.correlate(&mut second).await.unwrap();
        assert_eq!(index.call_counts().scms, 2);
    }

    #[tokio::test]
    async fn short_response_abandons_whole_batch() {
        let (correlator, _) = correlator(r#"{ "scms": [ { "id": 101, "name": "lodash/lodash" } ] }"#);
        let mut deps = vec![dep("lodash", Some(101)), dep("express", Some(205))];
        let err = correlator.correlate(&mut deps).await.unwrap_err();
        assert!(matches!(
            err,
            AuditorError::ProtocolMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
        assert!(deps.iter().all(|d| d.resolved_scm.is_none()));
        assert!(deps.iter().all(|d| d.scm_lookup == ScmLookup::Abandoned));
        assert_eq!(correlator.live_entries(), 0);
    }

    #[tokio::test]
    async fn connectivity_failure_leaves_lookup_unrecorded() {
        let (correlator, index) = correlator(SNAPSHOT);
        index.set_unreachable(true);
        let mut deps = vec![dep("lodash", Some(101))];
        let err = correlator.correlate(&mut deps).await.unwrap_err();
        assert!(err.is_connectivity());
        assert_eq!(deps[0].scm_lookup, ScmLookup::NotAttempted);
    }
}
