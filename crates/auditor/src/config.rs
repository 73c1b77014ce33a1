//! 감사 서비스 설정
//!
//! [`AuditorConfig`]는 core의 [`DepwatchConfig`]에서 파생되며,
//! 서비스 고유 설정(이벤트 채널 용량)을 추가합니다.
//!
//! # 사용 예시
//!
//! ```
//! use depwatch_auditor::config::{AuditorConfig, AuditorConfigBuilder};
//!
//! let config = AuditorConfig::default();
//! config.validate().unwrap();
//!
//! let config = AuditorConfigBuilder::new()
//!     .staleness_hours(6)
//!     .include_dev(false)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.staleness_hours, 6);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use depwatch_core::DepwatchConfig;
use depwatch_core::config::{DEFAULT_INDEX_URL, DEFAULT_STALENESS_HOURS};

use crate::error::AuditorError;
use crate::manifest::ReaderOptions;

/// 설정 상한값 상수
const MAX_STALENESS_HOURS: u64 = 24 * 365;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;
const MAX_FILE_SIZE: usize = 100 * 1024 * 1024; // 100 MB
const MAX_EVENT_CHANNEL_CAPACITY: usize = 100_000;

/// 영속 캐시 파일 이름
const CACHE_FILE_NAME: &str = "audit-cache.json";
/// 원격 응답 캐시 파일 이름
const RESPONSES_FILE_NAME: &str = "responses.json";

/// 감사 서비스 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditorConfig {
    /// 인덱스 API 기본 주소
    pub index_url: String,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 연결 실패 시 저장된 응답 사용 여부
    pub offline_fallback: bool,
    pub user_agent: String,
    /// stale 판정 기준 (시간)
    pub staleness_hours: u64,
    /// 감사 결과 영속 저장 여부
    pub persist: bool,
    pub data_dir: PathBuf,
    pub ignore_dirs: Vec<String>,
    /// 매니페스트 최대 크기 (바이트)
    pub max_file_size: usize,
    pub include_dev: bool,
    pub include_optional: bool,

    // --- 서비스 고유 확장 ---
    /// finding 이벤트 채널 용량
    pub event_channel_capacity: usize,
}

impl Default for AuditorConfig {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_owned(),
            request_timeout_secs: 30,
            offline_fallback: true,
            user_agent: format!("depwatch/{}", env!("CARGO_PKG_VERSION")),
            staleness_hours: DEFAULT_STALENESS_HOURS,
            persist: true,
            data_dir: PathBuf::from(".depwatch"),
            ignore_dirs: vec!["node_modules".to_owned(), ".git".to_owned()],
            max_file_size: 10 * 1024 * 1024,
            include_dev: true,
            include_optional: true,
            event_channel_capacity: 1024,
        }
    }
}

impl AuditorConfig {
    /// core 설정에서 감사 서비스 설정을 생성합니다.
    ///
    /// core 설정에 없는 확장 필드는 기본값을 사용합니다.
    pub fn from_core(core: &DepwatchConfig) -> Self {
        Self {
            index_url: core.index.url.clone(),
            request_timeout_secs: core.index.request_timeout_secs,
            offline_fallback: core.index.offline_fallback,
            user_agent: core.index.user_agent.clone(),
            staleness_hours: core.cache.staleness_hours,
            persist: core.cache.persist,
            data_dir: PathBuf::from(&core.general.data_dir),
            ignore_dirs: core.scan.ignore_dirs.clone(),
            max_file_size: core.scan.max_file_size,
            include_dev: core.scan.include_dev,
            include_optional: core.scan.include_optional,
            ..Self::default()
        }
    }

    /// 설정 값의 유효성을 검증합니다.
    ///
    /// # 검증 규칙
    ///
    /// - `index_url`: `http://` 또는 `https://`로 시작
    /// - `request_timeout_secs`: 1-300
    /// - `staleness_hours`: 1-8760
    /// - `max_file_size`: 1-104857600 (100MB)
    /// - `event_channel_capacity`: 1-100000
    /// - `persist`가 켜져 있으면 `data_dir`이 비어 있으면 안 됨
    pub fn validate(&self) -> Result<(), AuditorError> {
        if !(self.index_url.starts_with("http://") || self.index_url.starts_with("https://")) {
            return Err(config_error("index_url", "must start with http:// or https://"));
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS {
            return Err(config_error(
                "request_timeout_secs",
                format!("must be 1-{MAX_REQUEST_TIMEOUT_SECS}"),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(config_error("user_agent", "must not be empty"));
        }
        if self.staleness_hours == 0 || self.staleness_hours > MAX_STALENESS_HOURS {
            return Err(config_error(
                "staleness_hours",
                format!("must be 1-{MAX_STALENESS_HOURS}"),
            ));
        }
        if self.max_file_size == 0 || self.max_file_size > MAX_FILE_SIZE {
            return Err(config_error("max_file_size", format!("must be 1-{MAX_FILE_SIZE}")));
        }
        if self.event_channel_capacity == 0
            || self.event_channel_capacity > MAX_EVENT_CHANNEL_CAPACITY
        {
            return Err(config_error(
                "event_channel_capacity",
                format!("must be 1-{MAX_EVENT_CHANNEL_CAPACITY}"),
            ));
        }
        if self.persist && self.data_dir.as_os_str().is_empty() {
            return Err(config_error("data_dir", "must not be empty when persist is enabled"));
        }
        Ok(())
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_hours.saturating_mul(3600))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            include_dev: self.include_dev,
            include_optional: self.include_optional,
        }
    }

    /// 감사 결과 영속 파일 경로
    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(CACHE_FILE_NAME)
    }

    /// 원격 응답 캐시 파일 경로
    pub fn responses_path(&self) -> PathBuf {
        self.data_dir.join(RESPONSES_FILE_NAME)
    }
}

fn config_error(field: &str, reason: impl Into<String>) -> AuditorError {
    AuditorError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// [`AuditorConfig`] 빌더
#[derive(Default)]
pub struct AuditorConfigBuilder {
    config: AuditorConfig,
}

impl AuditorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_url(mut self, url: impl Into<String>) -> Self {
        self.config.index_url = url.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn offline_fallback(mut self, enabled: bool) -> Self {
        self.config.offline_fallback = enabled;
        self
    }

    pub fn staleness_hours(mut self, hours: u64) -> Self {
        self.config.staleness_hours = hours;
        self
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.config.persist = persist;
        self
    }

    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.data_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn ignore_dirs(mut self, dirs: Vec<String>) -> Self {
        self.config.ignore_dirs = dirs;
        self
    }

    pub fn max_file_size(mut self, size: usize) -> Self {
        self.config.max_file_size = size;
        self
    }

    pub fn include_dev(mut self, include: bool) -> Self {
        self.config.include_dev = include;
        self
    }

    pub fn include_optional(mut self, include: bool) -> Self {
        self.config.include_optional = include;
        self
    }

    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.event_channel_capacity = capacity;
        self
    }

    /// 설정을 검증하고 빌드합니다.
    ///
    /// # Errors
    ///
    /// 유효성 검증 실패 시 `AuditorError::Config` 반환
    pub fn build(self) -> Result<AuditorConfig, AuditorError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
