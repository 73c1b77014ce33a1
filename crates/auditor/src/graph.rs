//! 전이 의존성 그래프 확장

use std::sync::Arc;

use tracing::debug;

use crate::error::AuditorError;
use crate::index::VulnerabilityIndex;
use crate::types::{ArtifactRef, PackageDependency, ScmLookup};

/// 해석된 루트 의존성을 평탄화된 전이 의존성 목록으로 확장합니다.
pub struct DependencyGraphExpander {
    index: Arc<dyn VulnerabilityIndex>,
}

impl DependencyGraphExpander {
    pub fn new(index: Arc<dyn VulnerabilityIndex>) -> Self {
        Self { index }
    }

    /// 루트를 첫 항목으로 하는 평탄화된 의존성 목록을 반환합니다.
    ///
    /// - 해석되지 않은 루트는 선언 그대로 `[root]`
    /// - 모든 항목은 루트의 소스 위치를 물려받음
    /// - 루트와 이름이 같은 항목은 루트로 표시
    /// - 중복 항목은 그대로 유지
    /// - 원격 그래프에 루트가 없으면 맨 앞에 추가
    pub async fn expand(
        &self,
        root: &PackageDependency,
    ) -> Result<Vec<PackageDependency>, AuditorError> {
        let Some(artifact) = root.resolved_artifact.as_ref() else {
            return Ok(vec![root.clone()]);
        };

        let graph = self.index.dependency_graph(artifact).await?;

        let mut expanded = Vec::with_capacity(graph.len() + 1);
        let starts_with_root = graph
            .first()
            .is_some_and(|first| first.package_name == root.name);
        if !starts_with_root {
            expanded.push(root.clone());
        }

        for node in graph {
            let entry = if node.package_name == root.name {
                let mut entry = root.clone();
                entry.resolved_artifact = Some(node);
                entry
            } else {
                transitive(root, node)
            };
            expanded.push(entry);
        }

        debug!(
            package = %root.name,
            artifact_id = artifact.id,
            entries = expanded.len(),
            "dependency graph expanded"
        );
        Ok(expanded)
    }
}

fn transitive(root: &PackageDependency, node: ArtifactRef) -> PackageDependency {
    PackageDependency {
        ecosystem: root.ecosystem,
        name: node.package_name.clone(),
        version_constraint: node.version.clone(),
        position: root.position,
        is_optional: root.is_optional,
        is_root: false,
        resolved_artifact: Some(node),
        resolved_scm: None,
        scm_lookup: ScmLookup::NotAttempted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::LocalIndex;
    use crate::types::{Ecosystem, SourcePosition};

    const SNAPSHOT: &str = r#"{
  "artifacts": [
    { "id": 1, "ecosystem": "npm", "package_name": "express", "version": "4.18.2", "dependencies": [2, 3] },
    { "id": 2, "ecosystem": "npm", "package_name": "body-parser", "version": "1.20.1", "dependencies": [4] },
    { "id": 3, "ecosystem": "npm", "package_name": "cookie", "version": "0.5.0", "dependencies": [4] },
    { "id": 4, "ecosystem": "npm", "package_name": "bytes", "version": "3.1.2" }
  ]
}"#;

    fn expander() -> (DependencyGraphExpander, Arc<LocalIndex>) {
        let index = Arc::new(LocalIndex::from_json(SNAPSHOT).unwrap());
        (
            DependencyGraphExpander::new(Arc::clone(&index) as Arc<dyn VulnerabilityIndex>),
            index,
        )
    }

    fn root(resolved: Option<ArtifactRef>) -> PackageDependency {
        let mut dep = PackageDependency::declared(
            Ecosystem::Npm,
            "express",
            "^4.18.0",
            SourcePosition::new(7, 120, 129),
            false,
        );
        dep.resolved_artifact = resolved;
        dep
    }

    fn express() -> ArtifactRef {
        ArtifactRef {
            id: 1,
            package_name: "express".into(),
            version: "4.18.2".into(),
            scm_id: None,
            dependency_graph: None,
        }
    }

    #[tokio::test]
    async fn unresolved_root_is_returned_as_declared() {
        let (expander, index) = expander();
        let declared = root(None);
        let expanded = expander.expand(&declared).await.unwrap();
        assert_eq!(expanded, vec![declared]);
        assert_eq!(index.call_counts().graph, 0);
    }

    #[tokio::test]
    async fn root_first_and_positions_inherited() {
        let (expander, _) = expander();
        let expanded = expander.expand(&root(Some(express()))).await.unwrap();

        assert_eq!(expanded[0].name, "express");
        assert!(expanded[0].is_root);
        assert_eq!(expanded[0].version_constraint, "^4.18.0");
        assert!(expanded.iter().all(|d| d.position == SourcePosition::new(7, 120, 129)));
        assert!(expanded[1..].iter().all(|d| !d.is_root && d.is_resolved()));
    }

    #[tokio::test]
    async fn duplicates_are_preserved() {
        let (expander, _) = expander();
        let expanded = expander.expand(&root(Some(express()))).await.unwrap();
        let names: Vec<&str> = expanded.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["express", "body-parser", "bytes", "cookie", "bytes"]);
        assert_eq!(expanded[2].version_constraint, "3.1.2");
    }

    #[tokio::test]
    async fn root_is_prepended_when_graph_omits_it() {
        let (expander, _) = expander();
        let unknown = ArtifactRef {
            id: 999,
            ..express()
        };
        let expanded = expander.expand(&root(Some(unknown))).await.unwrap();
        assert_eq!(expanded.len(), 1);
        assert!(expanded[0].is_root);
        assert_eq!(expanded[0].resolved_artifact.as_ref().map(|a| a.id), Some(999));
    }

    #[tokio::test]
    async fn connectivity_failure_propagates() {
        let (expander, index) = expander();
        index.set_unreachable(true);
        let err = expander.expand(&root(Some(express()))).await.unwrap_err();
        assert!(err.is_connectivity());
    }
}
