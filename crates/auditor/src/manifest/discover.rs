//! 프로젝트 트리에서 매니페스트 파일을 찾습니다 (동기 I/O).
//!
//! `tokio::task::spawn_blocking` 내에서 호출되어야 합니다.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::ReaderRegistry;
use crate::error::AuditorError;

/// `root` 아래에서 등록된 리더가 처리할 수 있는 파일을 재귀적으로 찾습니다.
///
/// `ignore_dirs`에 포함된 이름의 디렉토리(예: `node_modules`)는 내려가지 않고,
/// 심볼릭 링크는 따라가지 않습니다. 결과는 경로 순으로 정렬됩니다.
/// `root`가 파일이면 처리 가능할 때 그 파일 하나만 반환합니다.
pub fn discover_manifests(
    root: &Path,
    registry: &ReaderRegistry,
    ignore_dirs: &[String],
) -> Result<Vec<PathBuf>, AuditorError> {
    if !root.exists() {
        warn!(path = %root.display(), "scan path does not exist");
        return Ok(Vec::new());
    }
    if root.is_file() {
        return Ok(if registry.accepts(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| AuditorError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "failed to read directory entry");
                    continue;
                }
            };
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "failed to read file type");
                    continue;
                }
            };
            let path = entry.path();

            if file_type.is_dir() {
                let ignored = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| ignore_dirs.iter().any(|d| d == name));
                if ignored {
                    debug!(path = %path.display(), "skipping ignored directory");
                } else {
                    pending.push(path);
                }
            } else if file_type.is_file() && registry.accepts(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}
