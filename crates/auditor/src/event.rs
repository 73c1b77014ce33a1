//! 감사 결과 이벤트
//!
//! [`FindingEvent`]는 [`FindingNotice`] 하나를 감싸는 이벤트입니다.
//! core의 [`Event`] trait을 구현하여 `tokio::mpsc` 채널로 전달됩니다.
//!
//! # 사용 예시
//!
//! ```
//! use depwatch_auditor::event::FindingEvent;
//! use depwatch_auditor::types::FindingNotice;
//! use depwatch_core::event::Event;
//!
//! let event = FindingEvent::new(FindingNotice::Clear {
//!     source_file: "package.json".to_owned(),
//! });
//! assert_eq!(event.event_type(), "clear");
//! ```

use std::fmt;

use depwatch_core::event::{
    EVENT_TYPE_CLEAR, EVENT_TYPE_FINDING, Event, EventMetadata, MODULE_AUDITOR,
};

use crate::types::FindingNotice;

/// finding 또는 파일 초기화 이벤트
#[derive(Debug, Clone)]
pub struct FindingEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 전달할 알림
    pub notice: FindingNotice,
}

impl FindingEvent {
    /// 새로운 trace를 시작하는 이벤트를 생성합니다.
    pub fn new(notice: FindingNotice) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_AUDITOR),
            notice,
        }
    }

    /// 감사 패스의 trace에 연결된 이벤트를 생성합니다.
    pub fn with_trace(notice: FindingNotice, trace_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::new(MODULE_AUDITOR, trace_id),
            notice,
        }
    }
}

impl Event for FindingEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        match self.notice {
            FindingNotice::Clear { .. } => EVENT_TYPE_CLEAR,
            FindingNotice::Finding(_) => EVENT_TYPE_FINDING,
        }
    }
}

impl fmt::Display for FindingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = &self.id[..8.min(self.id.len())];
        match &self.notice {
            FindingNotice::Clear { source_file } => {
                write!(f, "FindingEvent[{id}] clear source={source_file}")
            }
            FindingNotice::Finding(finding) => write!(
                f,
                "FindingEvent[{id}] source={} dependency={} severity={} vulnerabilities={}",
                finding.source_file,
                finding.dependency,
                finding.severity,
                finding.vulnerabilities.len(),
            ),
        }
    }
}
