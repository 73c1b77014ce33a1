//! pom.xml 리더
//!
//! [`MavenManifestReader`]는 `project > dependencies > dependency` 요소에서
//! `groupId:artifactId`와 버전을 추출합니다. `dependencyManagement`나 플러그인
//! 의존성은 읽지 않습니다.
//!
//! `${...}` 속성 참조는 `<properties>`와 `project.version`/`project.groupId`로
//! 치환합니다. 치환되지 않은 참조는 그대로 남아 원격 해석에서 제외됩니다.
//!
//! 버전 확정(관리 버전, 범위 해석)은 [`CoordinateResolver`]에 위임합니다.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, warn};

use super::{LineIndexer, ManifestReader, ReaderOptions, file_name_is};
use crate::error::AuditorError;
use crate::types::{DependencyEvent, Ecosystem, PackageDependency};

/// Maven 좌표 (group:artifact:version)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenCoordinate {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl MavenCoordinate {
    /// 인덱스 조회에 쓰는 패키지 이름 (`group:artifact`)
    pub fn package_name(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }
}

/// Maven 좌표 해석기
///
/// 선언된 좌표를 저장소 규칙에 따라 확정된 좌표로 바꿉니다.
pub trait CoordinateResolver: Send + Sync {
    fn resolve(&self, coordinate: MavenCoordinate) -> Result<MavenCoordinate, AuditorError>;
}

/// 선언된 좌표를 그대로 돌려주는 기본 해석기
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectCoordinateResolver;

impl CoordinateResolver for DirectCoordinateResolver {
    fn resolve(&self, coordinate: MavenCoordinate) -> Result<MavenCoordinate, AuditorError> {
        Ok(coordinate)
    }
}

/// pom.xml 리더
pub struct MavenManifestReader {
    options: ReaderOptions,
    coordinates: Arc<dyn CoordinateResolver>,
}

impl MavenManifestReader {
    pub fn new(options: ReaderOptions, coordinates: Arc<dyn CoordinateResolver>) -> Self {
        Self {
            options,
            coordinates,
        }
    }
}

impl Default for MavenManifestReader {
    fn default() -> Self {
        Self::new(ReaderOptions::default(), Arc::new(DirectCoordinateResolver))
    }
}

/// 파싱 중인 `<dependency>` 요소
#[derive(Default)]
struct RawDependency {
    group_id: String,
    artifact_id: String,
    version: String,
    scope: String,
    optional: bool,
}

/// 파싱 결과 (치환 전)
#[derive(Default)]
struct RawPom {
    group_id: String,
    version: String,
    properties: HashMap<String, String>,
    dependencies: Vec<RawDependency>,
}

fn parse_pom(path: &str, content: &str) -> Result<RawPom, AuditorError> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut pom = RawPom::default();
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<RawDependency> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                stack.push(name);
                if is_dependency_path(&stack) {
                    current = Some(RawDependency::default());
                }
            }
            Ok(Event::End(_)) => {
                if is_dependency_path(&stack)
                    && let Some(dep) = current.take()
                {
                    pom.dependencies.push(dep);
                }
                stack.pop();
            }
            Ok(Event::Text(t)) => {
                let text = reader
                    .decoder()
                    .decode(t.as_ref())
                    .map_err(|e| AuditorError::ManifestParse {
                        path: path.to_owned(),
                        reason: e.to_string(),
                    })?
                    .trim()
                    .to_owned();
                apply_text(&stack, text, &mut pom, current.as_mut());
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AuditorError::ManifestParse {
                    path: path.to_owned(),
                    reason: format!("at position {}: {e}", reader.buffer_position()),
                });
            }
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(AuditorError::ManifestParse {
            path: path.to_owned(),
            reason: format!("unclosed element '{}'", stack.join(">")),
        });
    }
    Ok(pom)
}

fn is_dependency_path(stack: &[String]) -> bool {
    matches!(stack, [p, d, dep] if p == "project" && d == "dependencies" && dep == "dependency")
}

fn apply_text(stack: &[String], text: String, pom: &mut RawPom, current: Option<&mut RawDependency>) {
    let path: Vec<&str> = stack.iter().map(String::as_str).collect();
    match path.as_slice() {
        ["project", "groupId"] => pom.group_id = text,
        ["project", "version"] => pom.version = text,
        ["project", "parent", "groupId"] if pom.group_id.is_empty() => pom.group_id = text,
        ["project", "parent", "version"] if pom.version.is_empty() => pom.version = text,
        ["project", "properties", key] => {
            pom.properties.insert((*key).to_owned(), text);
        }
        ["project", "dependencies", "dependency", field] => {
            if let Some(dep) = current {
                match *field {
                    "groupId" => dep.group_id = text,
                    "artifactId" => dep.artifact_id = text,
                    "version" => dep.version = text,
                    "scope" => dep.scope = text,
                    "optional" => dep.optional = text.eq_ignore_ascii_case("true"),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

/// `${key}` 참조를 치환합니다. 모르는 키는 그대로 둡니다.
fn interpolate(value: &str, pom: &RawPom) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        let resolved = match key {
            "project.version" | "pom.version" | "version" if !pom.version.is_empty() => {
                Some(pom.version.as_str())
            }
            "project.groupId" | "pom.groupId" if !pom.group_id.is_empty() => {
                Some(pom.group_id.as_str())
            }
            _ => pom.properties.get(key).map(String::as_str),
        };
        match resolved {
            Some(v) => out.push_str(v),
            None => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

impl ManifestReader for MavenManifestReader {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Maven
    }

    fn accepts(&self, path: &Path) -> bool {
        file_name_is(path, "pom.xml")
    }

    fn run(&self, path: &Path, content: &str) -> Result<Vec<DependencyEvent>, AuditorError> {
        let source = path.display().to_string();
        let pom = parse_pom(&source, content)?;
        let indexer = LineIndexer::new(content);

        let mut events = Vec::with_capacity(pom.dependencies.len() + 1);
        events.push(DependencyEvent::Clear {
            source_file: source.clone(),
        });

        for raw in &pom.dependencies {
            if raw.group_id.is_empty() || raw.artifact_id.is_empty() {
                warn!(source = %source, "skipping dependency without groupId or artifactId");
                continue;
            }
            if raw.scope == "test" && !self.options.include_dev {
                continue;
            }
            if raw.optional && !self.options.include_optional {
                continue;
            }

            let declared = MavenCoordinate {
                group_id: interpolate(&raw.group_id, &pom),
                artifact_id: interpolate(&raw.artifact_id, &pom),
                version: interpolate(&raw.version, &pom),
            };
            let coordinate = match self.coordinates.resolve(declared.clone()) {
                Ok(resolved) => resolved,
                Err(e) => {
                    debug!(coordinate = %declared.package_name(), error = %e, "coordinate resolution failed, using declared version");
                    declared
                }
            };

            let needle = format!("<artifactId>{}</artifactId>", raw.artifact_id);
            let position = indexer.first(&needle, ("<artifactId>".len(), raw.artifact_id.len()));
            events.push(DependencyEvent::Add(PackageDependency::declared(
                Ecosystem::Maven,
                coordinate.package_name(),
                coordinate.version,
                position,
                raw.optional,
            )));
        }

        Ok(events)
    }
}
