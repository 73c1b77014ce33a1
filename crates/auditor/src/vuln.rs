//! 취약점 결합 -- SCM별 취약점 조회와 심각도 분류

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AuditorError;
use crate::index::VulnerabilityIndex;
use crate::types::{
    ClassifiedVulnerability, Ecosystem, FindingSeverity, PackageDependency, ScmRef,
    VulnerabilityRecord,
};

/// 의존성에 알려진 취약점을 결합하고 분류합니다.
///
/// 같은 인스턴스 안에서는 SCM id별 조회 결과를 재사용하므로,
/// 파이프라인은 패스마다 새 joiner를 만듭니다.
pub struct VulnerabilityJoiner {
    index: Arc<dyn VulnerabilityIndex>,
    memo: Mutex<HashMap<i64, Arc<Vec<VulnerabilityRecord>>>>,
}

impl VulnerabilityJoiner {
    pub fn new(index: Arc<dyn VulnerabilityIndex>) -> Self {
        Self {
            index,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// 저장소의 취약점 목록
    pub async fn vulnerabilities_for(
        &self,
        scm: &ScmRef,
    ) -> Result<Arc<Vec<VulnerabilityRecord>>, AuditorError> {
        let mut memo = self.memo.lock().await;
        if let Some(records) = memo.get(&scm.id) {
            return Ok(Arc::clone(records));
        }
        let records = Arc::new(self.index.find_vulnerabilities(scm).await?);
        debug!(scm_id = scm.id, count = records.len(), "vulnerabilities fetched");
        memo.insert(scm.id, Arc::clone(&records));
        Ok(records)
    }

    /// 영향 판정이 참이면 `Error`, 거짓이거나 판정 정보가 없으면 `Info`
    pub fn classify(
        record: &VulnerabilityRecord,
        ecosystem: Ecosystem,
        name: &str,
        version: &str,
    ) -> FindingSeverity {
        match record.affects(ecosystem, name, version) {
            Some(true) => FindingSeverity::Error,
            Some(false) | None => FindingSeverity::Info,
        }
    }

    /// 의존성 하나에 대한 분류된 취약점 목록
    ///
    /// SCM이 연결되지 않은 의존성은 빈 목록입니다.
    pub async fn join(
        &self,
        dep: &PackageDependency,
    ) -> Result<Vec<ClassifiedVulnerability>, AuditorError> {
        let Some(scm) = dep.resolved_scm.as_ref() else {
            return Ok(Vec::new());
        };
        let records = self.vulnerabilities_for(scm).await?;
        let version = dep.effective_version();
        Ok(records
            .iter()
            .map(|record| ClassifiedVulnerability {
                severity: Self::classify(record, dep.ecosystem, &dep.name, version),
                record: record.clone(),
            })
            .collect())
    }

    /// 여러 의존성을 순서대로 결합합니다.
    pub async fn join_all(
        &self,
        deps: &[PackageDependency],
    ) -> Result<Vec<Vec<ClassifiedVulnerability>>, AuditorError> {
        let mut out = Vec::with_capacity(deps.len());
        for dep in deps {
            out.push(self.join(dep).await?);
        }
        Ok(out)
    }
}
