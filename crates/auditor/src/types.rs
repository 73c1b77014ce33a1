//! 도메인 타입 -- 의존성 감사 전용 데이터 구조
//!
//! 선언된 의존성, 원격 인덱스가 돌려주는 아티팩트/SCM/취약점 레코드,
//! 그리고 감사 결과([`Finding`], [`MarkerRecord`], [`FileAudit`])를 정의합니다.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use depwatch_core::types::{Ecosystem, FindingSeverity};

use crate::version::{self, Version, VersionRange};

/// 매니페스트 내 위치
///
/// `line`은 1부터 시작하고 오프셋은 파일 시작 기준 바이트 위치입니다.
/// 모두 0이면 위치를 알 수 없다는 뜻입니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    pub line: usize,
    pub offset_start: usize,
    pub offset_end: usize,
}

impl SourcePosition {
    pub fn new(line: usize, offset_start: usize, offset_end: usize) -> Self {
        Self {
            line,
            offset_start,
            offset_end,
        }
    }
}

/// SCM 조회 시도 기록
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScmLookup {
    /// 아직 상관 분석을 거치지 않음
    #[default]
    NotAttempted,
    /// scm id가 없거나 0 이하라서 조회하지 않음
    Skipped,
    /// SCM 레코드가 연결됨
    Attached,
    /// 배치 응답 불일치로 연결을 포기함
    Abandoned,
}

/// 원격 인덱스에 보내는 패키지 조회 키
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRef {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub version: String,
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.name, self.version, self.ecosystem)
    }
}

/// 원격 인덱스가 식별한 특정 버전의 아티팩트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// 인덱스 내 아티팩트 id
    pub id: i64,
    /// 패키지 이름
    pub package_name: String,
    /// 버전 문자열
    pub version: String,
    /// 소스 저장소 id (없거나 0 이하일 수 있음)
    #[serde(default)]
    pub scm_id: Option<i64>,
    /// 의존성 그래프 참조 (인덱스가 제공하는 경우)
    #[serde(default)]
    pub dependency_graph: Option<String>,
}

impl ArtifactRef {
    /// 파싱된 버전
    pub fn parsed_version(&self) -> Version {
        Version::parse(&self.version)
    }

    /// 상관 분석 대상이 되는 양수 scm id
    pub fn queryable_scm_id(&self) -> Option<i64> {
        self.scm_id.filter(|id| *id > 0)
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} (#{})", self.package_name, self.version, self.id)
    }
}

/// 소스 저장소 레코드
///
/// 같은 저장소를 가리키는 모든 의존성이 `Arc`로 공유합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmRef {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub vulnerability_ids: Vec<String>,
}

/// 취약점 영향 판정 정보
///
/// `package`가 지정되어 있으면 이름이 다른 패키지에는 영향이 없습니다.
/// `ranges`와 `constraints` 중 하나라도 버전을 포함하면 영향이 있습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectsPredicate {
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub ranges: Vec<VersionRange>,
    /// 에코시스템 문법의 버전 제약 (예: `<4.17.12`, `[1.0,1.5)`)
    #[serde(default)]
    pub constraints: Vec<String>,
}

impl AffectsPredicate {
    /// 판정에 쓸 정보가 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty() && self.constraints.is_empty()
    }

    /// 이름/버전이 영향을 받는지 판정합니다. 판정할 정보가 없으면 `None`.
    pub fn evaluate(&self, ecosystem: Ecosystem, name: &str, version: &str) -> Option<bool> {
        if let Some(ref package) = self.package
            && package != name
        {
            return Some(false);
        }
        if self.is_empty() {
            return None;
        }
        let parsed = Version::parse(version);
        Some(
            version::is_affected(&parsed, &self.ranges)
                || self
                    .constraints
                    .iter()
                    .any(|c| version::satisfies(ecosystem, &parsed, c)),
        )
    }
}

/// 취약점 레코드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub affects: Option<AffectsPredicate>,
}

impl VulnerabilityRecord {
    /// 선언된 이름/버전에 대한 영향 여부. 판정 정보가 없으면 `None`.
    pub fn affects(&self, ecosystem: Ecosystem, name: &str, version: &str) -> Option<bool> {
        self.affects
            .as_ref()
            .and_then(|p| p.evaluate(ecosystem, name, version))
    }
}

/// 심각도가 부여된 취약점
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedVulnerability {
    pub record: VulnerabilityRecord,
    pub severity: FindingSeverity,
}

/// 매니페스트에 선언된 (또는 그래프 확장으로 얻은) 의존성
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDependency {
    pub ecosystem: Ecosystem,
    pub name: String,
    /// 선언된 버전 제약 (그래프 확장 항목은 해석된 버전)
    pub version_constraint: String,
    pub position: SourcePosition,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default)]
    pub is_root: bool,
    #[serde(default)]
    pub resolved_artifact: Option<ArtifactRef>,
    #[serde(default)]
    pub resolved_scm: Option<Arc<ScmRef>>,
    #[serde(default)]
    pub scm_lookup: ScmLookup,
}

impl PackageDependency {
    /// 매니페스트에서 읽은 루트 의존성을 생성합니다.
    pub fn declared(
        ecosystem: Ecosystem,
        name: impl Into<String>,
        version_constraint: impl Into<String>,
        position: SourcePosition,
        is_optional: bool,
    ) -> Self {
        Self {
            ecosystem,
            name: name.into(),
            version_constraint: version_constraint.into(),
            position,
            is_optional,
            is_root: true,
            resolved_artifact: None,
            resolved_scm: None,
            scm_lookup: ScmLookup::NotAttempted,
        }
    }

    /// 해석된 아티팩트가 있으면 그 버전, 없으면 선언된 제약
    pub fn effective_version(&self) -> &str {
        self.resolved_artifact
            .as_ref()
            .map_or(self.version_constraint.as_str(), |a| a.version.as_str())
    }

    /// 원격 조회용 키
    pub fn package_ref(&self) -> PackageRef {
        PackageRef {
            ecosystem: self.ecosystem,
            name: self.name.clone(),
            version: self.version_constraint.clone(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_artifact.is_some()
    }
}

impl fmt::Display for PackageDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.name, self.effective_version(), self.ecosystem)
    }
}

/// 매니페스트 리더가 내보내는 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum DependencyEvent {
    /// 파일의 이전 결과를 지움
    Clear { source_file: String },
    /// 선언된 의존성 하나
    Add(PackageDependency),
}

/// 의존성 하나에 대한 감사 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub source_file: String,
    pub position: SourcePosition,
    pub dependency: PackageDependency,
    pub vulnerabilities: Vec<ClassifiedVulnerability>,
    /// 취약점 심각도의 최댓값 (취약점이 없으면 `None`)
    pub severity: FindingSeverity,
}

impl Finding {
    pub fn new(
        source_file: impl Into<String>,
        dependency: PackageDependency,
        vulnerabilities: Vec<ClassifiedVulnerability>,
    ) -> Self {
        let severity = vulnerabilities
            .iter()
            .map(|v| v.severity)
            .max()
            .unwrap_or_default();
        Self {
            source_file: source_file.into(),
            position: dependency.position,
            dependency,
            vulnerabilities,
            severity,
        }
    }

    /// 표시 계층용 마커 레코드 목록
    ///
    /// 의존성 마커 하나 뒤에 취약점마다 마커가 하나씩 붙습니다.
    pub fn markers(&self) -> Vec<MarkerRecord> {
        let dep = &self.dependency;
        let kind = if dep.is_root {
            if dep.is_optional || !dep.is_resolved() {
                MarkerKind::OptionalDependency
            } else {
                MarkerKind::RootDependency
            }
        } else {
            MarkerKind::Dependency
        };

        let version = dep.effective_version().to_owned();
        let artifact_id = dep.resolved_artifact.as_ref().map(|a| a.id);
        let scm_id = dep.resolved_scm.as_ref().map(|s| s.id);

        let base = MarkerRecord {
            kind,
            line: self.position.line,
            char_start: self.position.offset_start,
            char_end: self.position.offset_end,
            message: format!("{} {}", dep.name, version),
            name: dep.name.clone(),
            version,
            optional: dep.is_optional,
            severity: self.severity,
            artifact_id,
            scm_id,
            vulnerability_id: None,
            url: None,
            summary: None,
        };

        let mut markers = Vec::with_capacity(1 + self.vulnerabilities.len());
        for v in &self.vulnerabilities {
            markers.push(MarkerRecord {
                kind: MarkerKind::Vulnerability,
                message: format!("{}: {}", v.record.id, v.record.title),
                severity: v.severity,
                vulnerability_id: Some(v.record.id.clone()),
                url: v.record.uri.clone(),
                summary: Some(v.record.description.clone()).filter(|s| !s.is_empty()),
                ..base.clone()
            });
        }
        markers.insert(0, base);
        markers
    }
}

/// 마커 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    RootDependency,
    OptionalDependency,
    Dependency,
    Vulnerability,
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootDependency => write!(f, "root"),
            Self::OptionalDependency => write!(f, "optional"),
            Self::Dependency => write!(f, "dependency"),
            Self::Vulnerability => write!(f, "vulnerability"),
        }
    }
}

/// 표시 계층이 소비하는 마커 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub kind: MarkerKind,
    pub line: usize,
    pub char_start: usize,
    pub char_end: usize,
    pub message: String,
    pub name: String,
    pub version: String,
    pub optional: bool,
    pub severity: FindingSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scm_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vulnerability_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// emitter가 리스너에 전달하는 알림
#[derive(Debug, Clone, PartialEq)]
pub enum FindingNotice {
    Clear { source_file: String },
    Finding(Finding),
}

impl FindingNotice {
    pub fn source_file(&self) -> &str {
        match self {
            Self::Clear { source_file } => source_file,
            Self::Finding(f) => &f.source_file,
        }
    }
}

/// 파일 하나의 감사 결과 (캐시 값)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAudit {
    pub source_file: String,
    pub ecosystem: Ecosystem,
    pub findings: Vec<Finding>,
    /// 감사 시각 (epoch millis)
    pub audited_at_ms: u64,
    /// 원격 대신 저장된 응답으로 만든 결과인지 여부
    #[serde(default)]
    pub served_offline: bool,
}

impl FileAudit {
    /// 파일 전체의 최대 심각도
    pub fn severity(&self) -> FindingSeverity {
        self.findings
            .iter()
            .map(|f| f.severity)
            .max()
            .unwrap_or_default()
    }

    pub fn dependency_count(&self) -> usize {
        self.findings.len()
    }

    pub fn vulnerability_count(&self) -> usize {
        self.findings.iter().map(|f| f.vulnerabilities.len()).sum()
    }

    /// `Error` 심각도 finding 수
    pub fn error_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == FindingSeverity::Error)
            .count()
    }
}

impl fmt::Display for FileAudit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FileAudit({}, {} dependencies, {} vulnerabilities, severity={})",
            self.source_file,
            self.dependency_count(),
            self.vulnerability_count(),
            self.severity(),
        )
    }
}
