//! 매니페스트 리더 -- package.json, pom.xml
//!
//! [`ManifestReader`] trait은 각 매니페스트 형식의 리더가 구현해야 하는 인터페이스입니다.
//! 리더는 `{name, version}` 추출만 담당하고, 해석/상관 분석은 파이프라인이 수행합니다.
//!
//! # 지원 형식
//!
//! - `package.json` (JSON) -- [`NpmManifestReader`]
//! - `pom.xml` (XML) -- [`MavenManifestReader`]
//!
//! # 확장
//!
//! 새로운 형식을 지원하려면 `ManifestReader` trait을 구현하고
//! [`ReaderRegistry::register`]로 등록합니다.

pub mod discover;
pub mod maven;
pub mod npm;

use std::path::Path;
use std::sync::Arc;

pub use discover::discover_manifests;
pub use maven::{CoordinateResolver, DirectCoordinateResolver, MavenManifestReader};
pub use npm::NpmManifestReader;

use crate::error::AuditorError;
use crate::types::{DependencyEvent, Ecosystem, SourcePosition};

/// 매니페스트 리더 trait
///
/// 한 번의 `run` 호출은 항상 `DependencyEvent::Clear`로 시작하고,
/// 이어서 선언된 의존성마다 `DependencyEvent::Add`를 하나씩 내보냅니다.
pub trait ManifestReader: Send + Sync {
    /// 이 리더가 담당하는 에코시스템
    fn ecosystem(&self) -> Ecosystem;

    /// 주어진 경로의 파일을 처리할 수 있는지 확인합니다.
    fn accepts(&self, path: &Path) -> bool;

    /// 매니페스트 내용을 읽어 이벤트 목록을 반환합니다.
    ///
    /// # Arguments
    ///
    /// - `path`: 원본 파일 경로 (이벤트의 `source_file`, 에러 메시지용)
    /// - `content`: 파일 내용 (UTF-8)
    fn run(&self, path: &Path, content: &str) -> Result<Vec<DependencyEvent>, AuditorError>;
}

/// 리더가 포함할 의존성 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// devDependencies / test scope 포함 여부
    pub include_dev: bool,
    /// optionalDependencies / `<optional>true</optional>` 포함 여부
    pub include_optional: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            include_dev: true,
            include_optional: true,
        }
    }
}

/// 등록된 리더 목록
pub struct ReaderRegistry {
    readers: Vec<Arc<dyn ManifestReader>>,
}

impl ReaderRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self {
            readers: Vec::new(),
        }
    }

    /// npm, Maven 리더가 등록된 레지스트리를 생성합니다.
    pub fn with_defaults(options: ReaderOptions) -> Self {
        Self::with_coordinate_resolver(options, Arc::new(DirectCoordinateResolver))
    }

    /// Maven 좌표 해석기를 지정하여 기본 리더를 등록합니다.
    pub fn with_coordinate_resolver(
        options: ReaderOptions,
        coordinates: Arc<dyn CoordinateResolver>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NpmManifestReader::new(options)));
        registry.register(Arc::new(MavenManifestReader::new(options, coordinates)));
        registry
    }

    /// 리더를 추가합니다.
    pub fn register(&mut self, reader: Arc<dyn ManifestReader>) {
        self.readers.push(reader);
    }

    /// 경로를 처리할 수 있는 첫 번째 리더를 찾습니다.
    pub fn reader_for(&self, path: &Path) -> Option<Arc<dyn ManifestReader>> {
        self.readers.iter().find(|r| r.accepts(path)).cloned()
    }

    /// 어떤 리더라도 처리할 수 있는 경로인지 확인합니다.
    pub fn accepts(&self, path: &Path) -> bool {
        self.readers.iter().any(|r| r.accepts(path))
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::with_defaults(ReaderOptions::default())
    }
}

/// 경로의 파일 이름이 `name`과 같은지 확인합니다.
pub(crate) fn file_name_is(path: &Path, name: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n == name)
}

/// 매니페스트 텍스트에서 위치를 찾는 도우미
pub(crate) struct LineIndexer<'a> {
    content: &'a str,
}

impl<'a> LineIndexer<'a> {
    pub(crate) fn new(content: &'a str) -> Self {
        Self { content }
    }

    /// `needle`의 첫 번째 등장 위치 중 `inner` 구간을 반환합니다.
    ///
    /// `inner`는 `needle` 안에서 표시할 부분의 (시작, 길이)입니다.
    /// 찾지 못하면 기본 위치(0)를 반환합니다.
    pub(crate) fn first(&self, needle: &str, inner: (usize, usize)) -> SourcePosition {
        match self.content.find(needle) {
            Some(idx) => {
                let start = idx + inner.0;
                SourcePosition::new(self.line_of(idx), start, start + inner.1)
            }
            None => SourcePosition::default(),
        }
    }

    /// 바이트 오프셋의 1 기반 줄 번호
    fn line_of(&self, offset: usize) -> usize {
        self.content.as_bytes()[..offset]
            .iter()
            .filter(|b| **b == b'\n')
            .count()
            + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn registry_finds_reader_by_file_name() {
        let registry = ReaderRegistry::default();
        assert_eq!(registry.len(), 2);

        let npm = registry
            .reader_for(&PathBuf::from("/project/package.json"))
            .unwrap();
        assert_eq!(npm.ecosystem(), Ecosystem::Npm);

        let maven = registry.reader_for(&PathBuf::from("/project/pom.xml")).unwrap();
        assert_eq!(maven.ecosystem(), Ecosystem::Maven);
    }

    #[test]
    fn registry_rejects_unknown_file() {
        let registry = ReaderRegistry::default();
        assert!(registry.reader_for(&PathBuf::from("Cargo.lock")).is_none());
        assert!(!registry.accepts(&PathBuf::from("")));
        assert!(ReaderRegistry::new().is_empty());
    }

    #[test]
    fn line_indexer_reports_line_and_offsets() {
        let content = "{\n  \"a\": \"1\",\n  \"lodash\": \"^4\"\n}";
        let pos = LineIndexer::new(content).first("\"lodash\"", (1, 6));
        assert_eq!(pos.line, 3);
        assert_eq!(&content[pos.offset_start..pos.offset_end], "lodash");
    }

    #[test]
    fn line_indexer_missing_needle_is_default() {
        let pos = LineIndexer::new("{}").first("\"x\"", (1, 1));
        assert_eq!(pos, SourcePosition::default());
    }
}
