//! 속성 저장소 -- 파일별 감사 결과와 원격 응답의 영속 계층
//!
//! [`PropertyStore`]는 `(namespace, name) -> value` 문자열 저장소입니다.
//! 감사 결과 캐시([`RefreshCache`](crate::cache::RefreshCache))와
//! 원격 응답 캐시([`ResponseCache`])가 이 저장소에 기록합니다.
//!
//! # 구현
//!
//! - [`MemoryStore`]: 프로세스 수명 동안만 유지
//! - [`JsonFileStore`]: 단일 JSON 파일에 write-through (임시 파일 기록 후 rename)
//!
//! # JSON 형식
//!
//! ```json
//! {
//!   "audit:/project/package.json": { "audit": "{...}", "timestamp": "1700000000000" },
//!   "responses": { "GET /scm/101": "[...]" }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::error::AuditorError;

/// 저장소 파일 최대 크기 (50 MB)
const MAX_STORE_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// 원격 응답 캐시가 사용하는 namespace
const RESPONSE_NAMESPACE: &str = "responses";

type Properties = BTreeMap<String, BTreeMap<String, String>>;

/// 네임스페이스 단위 키-값 저장소
pub trait PropertyStore: Send + Sync {
    /// 속성 값을 읽습니다. 없으면 `None`.
    fn get(&self, namespace: &str, name: &str) -> Result<Option<String>, AuditorError>;

    /// 속성 값을 기록합니다.
    fn set(&self, namespace: &str, name: &str, value: &str) -> Result<(), AuditorError>;

    /// 값이 하나 이상 있는 namespace 목록 (정렬됨)
    fn namespaces(&self) -> Result<Vec<String>, AuditorError>;
}

fn lock(props: &Mutex<Properties>) -> Result<MutexGuard<'_, Properties>, AuditorError> {
    props
        .lock()
        .map_err(|e| AuditorError::Store(format!("store lock poisoned: {e}")))
}

/// 메모리 저장소
#[derive(Default)]
pub struct MemoryStore {
    props: Mutex<Properties>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PropertyStore for MemoryStore {
    fn get(&self, namespace: &str, name: &str) -> Result<Option<String>, AuditorError> {
        Ok(lock(&self.props)?
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .cloned())
    }

    fn set(&self, namespace: &str, name: &str, value: &str) -> Result<(), AuditorError> {
        lock(&self.props)?
            .entry(namespace.to_owned())
            .or_default()
            .insert(name.to_owned(), value.to_owned());
        Ok(())
    }

    fn namespaces(&self) -> Result<Vec<String>, AuditorError> {
        Ok(lock(&self.props)?.keys().cloned().collect())
    }
}

/// JSON 파일 저장소
///
/// 열 때 파일 전체를 읽고, `set`마다 파일 전체를 다시 씁니다.
///
/// # Note
///
/// 동기 I/O를 수행합니다. async 컨텍스트의 빈번한 호출 경로에서는
/// `tokio::task::spawn_blocking`으로 감싸세요.
pub struct JsonFileStore {
    path: PathBuf,
    props: Mutex<Properties>,
}

impl JsonFileStore {
    /// 저장소 파일을 엽니다. 파일이 없으면 빈 저장소로 시작합니다.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditorError> {
        let path = path.into();
        let props = match std::fs::metadata(&path) {
            Ok(meta) => {
                if meta.len() > MAX_STORE_FILE_SIZE {
                    return Err(AuditorError::FileTooBig {
                        path: path.display().to_string(),
                        size: usize::try_from(meta.len()).unwrap_or(usize::MAX),
                        max: usize::try_from(MAX_STORE_FILE_SIZE).unwrap_or(usize::MAX),
                    });
                }
                let content = std::fs::read_to_string(&path).map_err(|e| AuditorError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?;
                serde_json::from_str(&content).map_err(|e| {
                    AuditorError::Store(format!("failed to parse {}: {e}", path.display()))
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "store file not found, starting empty");
                Properties::new()
            }
            Err(e) => {
                return Err(AuditorError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };

        Ok(Self {
            path,
            props: Mutex::new(props),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, props: &Properties) -> Result<(), AuditorError> {
        let io_err = |e: std::io::Error| AuditorError::Io {
            path: self.path.display().to_string(),
            source: e,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(props)
            .map_err(|e| AuditorError::Store(format!("failed to serialize store: {e}")))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl PropertyStore for JsonFileStore {
    fn get(&self, namespace: &str, name: &str) -> Result<Option<String>, AuditorError> {
        Ok(lock(&self.props)?
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .cloned())
    }

    fn set(&self, namespace: &str, name: &str, value: &str) -> Result<(), AuditorError> {
        let mut props = lock(&self.props)?;
        props
            .entry(namespace.to_owned())
            .or_default()
            .insert(name.to_owned(), value.to_owned());
        self.persist(&props)
    }

    fn namespaces(&self) -> Result<Vec<String>, AuditorError> {
        Ok(lock(&self.props)?.keys().cloned().collect())
    }
}

/// 원격 응답 캐시 (요청 키 → 원본 JSON)
///
/// 연결 실패 시 마지막으로 받은 응답을 대신 사용할 수 있도록 보관합니다.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn PropertyStore>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn PropertyStore>) -> Self {
        Self { store }
    }

    /// 메모리에만 보관하는 캐시
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, AuditorError> {
        self.store.get(RESPONSE_NAMESPACE, key)
    }

    pub fn put(&self, key: &str, json: &str) -> Result<(), AuditorError> {
        self.store.set(RESPONSE_NAMESPACE, key, json)
    }
}
