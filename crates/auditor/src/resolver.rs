//! 아티팩트 해석 -- 선언된 의존성을 인덱스의 아티팩트로 확정
//!
//! 매니페스트 파일 하나당 `find_artifacts` 배치 호출 한 번으로 모든 후보를 받고,
//! 패키지 이름마다 제약을 만족하는 가장 높은 버전을 고릅니다.
//!
//! 원격에서 해석할 수 없는 선언은 요청에서 제외하고 `None`으로 둡니다.
//!
//! - npm: 로컬 경로(`file:`, `./`, `../`, `/`, `~/`), URL(`://`),
//!   git 참조(`owner/repo`, `git+...`, `github:...`), `link:`/`workspace:`/`npm:` 별칭
//! - Maven: 버전이 비었거나 치환되지 않은 `${...}`가 남은 좌표

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use depwatch_core::metrics as m;

use crate::error::AuditorError;
use crate::index::{CALL_ARTIFACTS, VulnerabilityIndex};
use crate::types::{ArtifactRef, Ecosystem, PackageDependency, PackageRef};
use crate::version;

/// npm에서 원격 해석 대상이 아닌 버전 접두어
const NPM_NON_REGISTRY_PREFIXES: [&str; 11] = [
    "file:",
    "link:",
    "workspace:",
    "npm:",
    "git+",
    "git:",
    "github:",
    "gitlab:",
    "bitbucket:",
    "~/",
    ".",
];

/// 선언된 버전으로 원격 인덱스에 질의할 수 있는지 여부
pub fn is_remote_resolvable(dep: &PackageDependency) -> bool {
    let v = dep.version_constraint.trim();
    match dep.ecosystem {
        Ecosystem::Npm => {
            !(v.contains("://")
                || v.contains('/')
                || NPM_NON_REGISTRY_PREFIXES.iter().any(|p| v.starts_with(p)))
        }
        Ecosystem::Maven => !v.is_empty() && !v.contains("${"),
    }
}

/// 아티팩트 해석기
pub struct ArtifactResolver {
    index: Arc<dyn VulnerabilityIndex>,
}

impl ArtifactResolver {
    pub fn new(index: Arc<dyn VulnerabilityIndex>) -> Self {
        Self { index }
    }

    /// 선언된 의존성 목록을 이름 → 아티팩트 맵으로 해석합니다.
    ///
    /// 원격 해석 대상이 없으면 원격 호출을 하지 않습니다.
    ///
    /// # Errors
    ///
    /// - `AuditorError::Connectivity`: 인덱스에 도달할 수 없음 (배치 전체 중단)
    /// - `AuditorError::ProtocolMismatch`: 후보 목록 수가 요청 수와 다름
    pub async fn resolve(
        &self,
        source: &str,
        deps: &[PackageDependency],
    ) -> Result<HashMap<String, Option<ArtifactRef>>, AuditorError> {
        let mut resolved: HashMap<String, Option<ArtifactRef>> = HashMap::new();
        let mut requests: Vec<&PackageDependency> = Vec::new();

        for dep in deps {
            if is_remote_resolvable(dep) {
                requests.push(dep);
            } else {
                debug!(source, package = %dep.name, version = %dep.version_constraint, "excluded from remote resolution");
                resolved.entry(dep.name.clone()).or_insert(None);
            }
        }

        if requests.is_empty() {
            return Ok(resolved);
        }

        let packages: Vec<PackageRef> = requests.iter().map(|d| d.package_ref()).collect();
        let candidates = self.index.find_artifacts(&packages).await?;
        if candidates.len() != packages.len() {
            metrics::counter!(m::INDEX_PROTOCOL_MISMATCHES_TOTAL).increment(1);
            warn!(source, expected = packages.len(), actual = candidates.len(), "artifact lookup response size mismatch");
            return Err(AuditorError::ProtocolMismatch {
                call: CALL_ARTIFACTS.to_owned(),
                expected: packages.len(),
                actual: candidates.len(),
            });
        }

        for (dep, list) in requests.into_iter().zip(candidates) {
            let best = version::best_match(dep.ecosystem, &dep.version_constraint, &list, |a| {
                a.version.as_str()
            })
            .cloned();
            if best.is_none() {
                debug!(source, package = %dep.name, constraint = %dep.version_constraint, candidates = list.len(), "no satisfying candidate");
            }

            let slot = resolved.entry(dep.name.clone()).or_insert(None);
            match (slot.as_ref(), best) {
                (_, None) => {}
                (None, Some(best)) => *slot = Some(best),
                (Some(existing), Some(best)) => {
                    if version::compare(&best.parsed_version(), &existing.parsed_version())
                        == Ordering::Greater
                    {
                        *slot = Some(best);
                    }
                }
            }
        }

        debug!(source, requested = packages.len(), resolved = resolved.values().filter(|a| a.is_some()).count(), "artifact resolution completed");
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::LocalIndex;
    use crate::types::SourcePosition;

    const SNAPSHOT: &str = r#"{
  "artifacts": [
    { "id": 1, "ecosystem": "npm", "package_name": "lodash", "version": "4.17.0", "scm_id": 101 },
    { "id": 2, "ecosystem": "npm", "package_name": "lodash", "version": "4.17.21", "scm_id": 101 },
    { "id": 3, "ecosystem": "npm", "package_name": "lodash", "version": "4.18.0", "scm_id": 101 },
    { "id": 4, "ecosystem": "maven", "package_name": "junit:junit", "version": "4.12" },
    { "id": 5, "ecosystem": "maven", "package_name": "junit:junit", "version": "4.13.2" }
  ]
}"#;

    fn npm(name: &str, version: &str) -> PackageDependency {
        PackageDependency::declared(Ecosystem::Npm, name, version, SourcePosition::default(), false)
    }

    fn maven(name: &str, version: &str) -> PackageDependency {
        PackageDependency::declared(Ecosystem::Maven, name, version, SourcePosition::default(), false)
    }

    fn resolver() -> (ArtifactResolver, Arc<LocalIndex>) {
        let index = Arc::new(LocalIndex::from_json(SNAPSHOT).unwrap());
        (ArtifactResolver::new(Arc::clone(&index) as Arc<dyn VulnerabilityIndex>), index)
    }

    #[test]
    fn npm_local_and_git_versions_are_not_remote() {
        for v in [
            "file:../local",
            "./vendor/pkg",
            "../pkg",
            "/abs/pkg",
            "~/pkg",
            "https://example.com/pkg.tgz",
            "git+ssh://git@github.com/a/b.git",
            "github:a/b",
            "a/b",
            "link:../x",
        ] {
            assert!(!is_remote_resolvable(&npm("x", v)), "{v} should be excluded");
        }
        assert!(is_remote_resolvable(&npm("x", "^1.0.0")));
        assert!(is_remote_resolvable(&npm("x", "")));
        assert!(is_remote_resolvable(&npm("x", ">=1.0.0 <2.0.0")));
    }

    #[test]
    fn maven_unresolved_versions_are_not_remote() {
        assert!(!is_remote_resolvable(&maven("a:b", "")));
        assert!(!is_remote_resolvable(&maven("a:b", "${x.version}")));
        assert!(is_remote_resolvable(&maven("a:b", "[1.0,2.0)")));
    }

    #[tokio::test]
    async fn tilde_selects_highest_patch() {
        let (resolver, _) = resolver();
        let resolved = resolver
            .resolve("package.json", &[npm("lodash", "~4.17.0")])
            .await
            .unwrap();
        assert_eq!(resolved["lodash"].as_ref().unwrap().version, "4.17.21");
    }

    #[tokio::test]
    async fn caret_follows_npm_and_selects_next_minor() {
        let (resolver, _) = resolver();
        let resolved = resolver
            .resolve("package.json", &[npm("lodash", "^4.17.0")])
            .await
            .unwrap();
        assert_eq!(resolved["lodash"].as_ref().unwrap().version, "4.18.0");
    }

    #[tokio::test]
    async fn local_path_issues_no_remote_call() {
        let (resolver, index) = resolver();
        let resolved = resolver
            .resolve("package.json", &[npm("left-pad", "file:../local")])
            .await
            .unwrap();
        assert_eq!(resolved["left-pad"], None);
        assert_eq!(index.call_counts().artifacts, 0);
    }

    #[tokio::test]
    async fn one_batch_per_file_excluding_local_entries() {
        let (resolver, index) = resolver();
        let resolved = resolver
            .resolve(
                "package.json",
                &[
                    npm("lodash", "4.17.0"),
                    npm("left-pad", "file:../local"),
                    npm("missing", "^1.0.0"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(index.call_counts().artifacts, 1);
        let requests = index.artifact_requests();
        let names: Vec<&str> = requests[0].iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["lodash", "missing"]);
        assert_eq!(resolved["lodash"].as_ref().unwrap().id, 1);
        assert_eq!(resolved["missing"], None);
        assert_eq!(resolved["left-pad"], None);
    }

    #[tokio::test]
    async fn maven_range_resolution() {
        let (resolver, _) = resolver();
        let resolved = resolver
            .resolve("pom.xml", &[maven("junit:junit", "[4.0,5.0)")])
            .await
            .unwrap();
        assert_eq!(resolved["junit:junit"].as_ref().unwrap().version, "4.13.2");
    }

    #[tokio::test]
    async fn malformed_constraint_resolves_to_none() {
        let (resolver, _) = resolver();
        let resolved = resolver
            .resolve("package.json", &[npm("lodash", "^^4")])
            .await
            .unwrap();
        assert_eq!(resolved["lodash"], None);
    }

    #[tokio::test]
    async fn connectivity_failure_aborts_batch() {
        let (resolver, index) = resolver();
        index.set_unreachable(true);
        let err = resolver
            .resolve("package.json", &[npm("lodash", "^4.17.0")])
            .await
            .unwrap_err();
        assert!(err.is_connectivity());
    }

    struct ShortIndex;

    #[async_trait::async_trait]
    impl VulnerabilityIndex for ShortIndex {
        async fn find_artifacts(
            &self,
            _packages: &[PackageRef],
        ) -> Result<Vec<Vec<ArtifactRef>>, AuditorError> {
            Ok(Vec::new())
        }
        async fn dependency_graph(&self, _root: &ArtifactRef) -> Result<Vec<ArtifactRef>, AuditorError> {
            Ok(Vec::new())
        }
        async fn find_scms(&self, _ids: &[i64]) -> Result<Vec<crate::types::ScmRef>, AuditorError> {
            Ok(Vec::new())
        }
        async fn find_vulnerabilities(
            &self,
            _scm: &crate::types::ScmRef,
        ) -> Result<Vec<crate::types::VulnerabilityRecord>, AuditorError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn candidate_count_mismatch_is_protocol_error() {
        let resolver = ArtifactResolver::new(Arc::new(ShortIndex));
        let err = resolver
            .resolve("package.json", &[npm("a", "1.0.0"), npm("b", "1.0.0")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuditorError::ProtocolMismatch {
                expected: 2,
                actual: 0,
                ..
            }
        ));
    }
}
