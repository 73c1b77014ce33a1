//! package.json 리더
//!
//! [`NpmManifestReader`]는 `dependencies`, `devDependencies`, `optionalDependencies`를
//! 합쳐 선언된 의존성 목록을 만듭니다. 같은 이름이 여러 섹션에 있으면 하나로 합치고,
//! `optionalDependencies`에 있으면 선택 의존성으로 표시합니다.
//!
//! ```json
//! {
//!   "name": "my-app",
//!   "dependencies": { "lodash": "^4.17.0" },
//!   "optionalDependencies": { "fsevents": "^2.3.0" }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::{LineIndexer, ManifestReader, ReaderOptions, file_name_is};
use crate::error::AuditorError;
use crate::types::{DependencyEvent, Ecosystem, PackageDependency};

/// package.json 리더
pub struct NpmManifestReader {
    options: ReaderOptions,
}

/// package.json 구조 (파싱용)
#[derive(Deserialize)]
struct PackageJson {
    #[serde(default)]
    dependencies: Option<BTreeMap<String, Value>>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: Option<BTreeMap<String, Value>>,
    #[serde(default, rename = "optionalDependencies")]
    optional_dependencies: Option<BTreeMap<String, Value>>,
}

impl NpmManifestReader {
    pub fn new(options: ReaderOptions) -> Self {
        Self { options }
    }
}

impl Default for NpmManifestReader {
    fn default() -> Self {
        Self::new(ReaderOptions::default())
    }
}

/// 섹션 하나를 (이름 → (제약, optional)) 맵에 합칩니다.
fn merge_section(
    source: &str,
    section: Option<BTreeMap<String, Value>>,
    optional: bool,
    into: &mut BTreeMap<String, (String, bool)>,
) {
    for (name, value) in section.unwrap_or_default() {
        if name.trim().is_empty() {
            continue;
        }
        let Value::String(constraint) = value else {
            warn!(source, package = %name, "skipping dependency with non-string version");
            continue;
        };
        into.entry(name)
            .and_modify(|entry| entry.1 |= optional)
            .or_insert((constraint, optional));
    }
}

impl ManifestReader for NpmManifestReader {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn accepts(&self, path: &Path) -> bool {
        file_name_is(path, "package.json")
    }

    fn run(&self, path: &Path, content: &str) -> Result<Vec<DependencyEvent>, AuditorError> {
        let source = path.display().to_string();
        let manifest: PackageJson =
            serde_json::from_str(content).map_err(|e| AuditorError::ManifestParse {
                path: source.clone(),
                reason: e.to_string(),
            })?;

        let mut merged = BTreeMap::new();
        merge_section(&source, manifest.dependencies, false, &mut merged);
        if self.options.include_dev {
            merge_section(&source, manifest.dev_dependencies, false, &mut merged);
        }
        if self.options.include_optional {
            merge_section(&source, manifest.optional_dependencies, true, &mut merged);
        }

        let indexer = LineIndexer::new(content);
        let mut deps: Vec<PackageDependency> = merged
            .into_iter()
            .map(|(name, (constraint, optional))| {
                let position = indexer.first(&format!("\"{name}\""), (1, name.len()));
                PackageDependency::declared(Ecosystem::Npm, name, constraint, position, optional)
            })
            .collect();
        deps.sort_by(|a, b| {
            a.position
                .offset_start
                .cmp(&b.position.offset_start)
                .then_with(|| a.name.cmp(&b.name))
        });

        let mut events = Vec::with_capacity(deps.len() + 1);
        events.push(DependencyEvent::Clear {
            source_file: source,
        });
        events.extend(deps.into_iter().map(DependencyEvent::Add));
        Ok(events)
    }
}
