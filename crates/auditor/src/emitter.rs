//! finding 발행 -- 리스너 목록에 대한 동기 순차 디스패치
//!
//! [`FindingEmitter`]는 해석 순서대로 알림을 모든 리스너에 전달합니다.
//! 리스너 하나가 에러를 반환하거나 패닉해도 로그만 남기고 다음 리스너로 넘어갑니다.
//!
//! 디스패치 중에는 리스너 목록의 스냅샷을 사용하므로,
//! 리스너 안에서 다른 리스너를 추가하거나 제거해도 교착되지 않습니다.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::AuditorError;
use crate::event::FindingEvent;
use crate::types::{ClassifiedVulnerability, Finding, FindingNotice, MarkerRecord, PackageDependency};

/// finding 알림 수신자
pub trait FindingListener: Send + Sync {
    /// 알림 하나를 처리합니다.
    fn on_notice(&self, notice: &FindingNotice) -> Result<(), AuditorError>;
}

/// 등록된 리스너 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// finding 발행기
#[derive(Default)]
pub struct FindingEmitter {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn FindingListener>)>>,
    next_id: AtomicU64,
}

impl FindingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 리스너를 등록하고 식별자를 반환합니다.
    pub fn add_listener(&self, listener: Arc<dyn FindingListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push((id, listener)),
            Err(poisoned) => poisoned.into_inner().push((id, listener)),
        }
        id
    }

    /// 리스너를 제거합니다. 등록되어 있었으면 `true`.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.snapshot().len()
    }

    /// finding을 만들어 모든 리스너에 전달하고 반환합니다.
    pub fn emit(
        &self,
        source_file: &str,
        dependency: PackageDependency,
        vulnerabilities: Vec<ClassifiedVulnerability>,
    ) -> Finding {
        let finding = Finding::new(source_file, dependency, vulnerabilities);
        self.dispatch(FindingNotice::Finding(finding.clone()));
        finding
    }

    /// 파일의 이전 결과를 지우라는 알림을 전달합니다.
    pub fn clear(&self, source_file: &str) {
        self.dispatch(FindingNotice::Clear {
            source_file: source_file.to_owned(),
        });
    }

    fn snapshot(&self) -> Vec<(ListenerId, Arc<dyn FindingListener>)> {
        match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn dispatch(&self, notice: FindingNotice) {
        for (id, listener) in self.snapshot() {
            match catch_unwind(AssertUnwindSafe(|| listener.on_notice(&notice))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(listener = id.0, source = notice.source_file(), error = %e, "finding listener failed");
                }
                Err(_) => {
                    error!(listener = id.0, source = notice.source_file(), "finding listener panicked");
                }
            }
        }
    }
}

// ─── 기본 리스너 ──────────────────────────────────────────────────────

/// 알림을 [`FindingEvent`]로 감싸 mpsc 채널로 전달하는 리스너
pub struct ChannelListener {
    tx: mpsc::Sender<FindingEvent>,
    trace_id: Option<String>,
}

impl ChannelListener {
    pub fn new(tx: mpsc::Sender<FindingEvent>) -> Self {
        Self { tx, trace_id: None }
    }

    /// 모든 이벤트를 주어진 trace에 연결합니다.
    pub fn with_trace(tx: mpsc::Sender<FindingEvent>, trace_id: impl Into<String>) -> Self {
        Self {
            tx,
            trace_id: Some(trace_id.into()),
        }
    }
}

impl FindingListener for ChannelListener {
    fn on_notice(&self, notice: &FindingNotice) -> Result<(), AuditorError> {
        let event = match self.trace_id {
            Some(ref trace_id) => FindingEvent::with_trace(notice.clone(), trace_id.clone()),
            None => FindingEvent::new(notice.clone()),
        };
        self.tx
            .try_send(event)
            .map_err(|e| AuditorError::Channel(format!("finding channel: {e}")))
    }
}

/// 파일별 마커 레코드를 모으는 리스너
///
/// `Clear` 알림은 해당 파일의 마커를 모두 지웁니다.
#[derive(Default)]
pub struct MarkerSink {
    markers: Mutex<HashMap<String, Vec<MarkerRecord>>>,
}

impl MarkerSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 파일의 마커 목록 (발행 순서)
    pub fn markers(&self, source_file: &str) -> Vec<MarkerRecord> {
        self.markers
            .lock()
            .ok()
            .and_then(|m| m.get(source_file).cloned())
            .unwrap_or_default()
    }

    /// 마커가 있는 파일 목록 (정렬됨)
    pub fn files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .markers
            .lock()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        files.sort();
        files
    }
}

impl FindingListener for MarkerSink {
    fn on_notice(&self, notice: &FindingNotice) -> Result<(), AuditorError> {
        let mut markers = self
            .markers
            .lock()
            .map_err(|e| AuditorError::Channel(format!("marker sink lock poisoned: {e}")))?;
        match notice {
            FindingNotice::Clear { source_file } => {
                markers.remove(source_file);
                debug!(source = %source_file, "markers cleared");
            }
            FindingNotice::Finding(finding) => {
                markers
                    .entry(finding.source_file.clone())
                    .or_default()
                    .extend(finding.markers());
            }
        }
        Ok(())
    }
}
