//! 설정 관리 — depwatch.toml 파싱 및 런타임 설정
//!
//! [`DepwatchConfig`]는 모든 크레이트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`DEPWATCH_INDEX_URL=https://...` 형식)
//! 3. 설정 파일 (`depwatch.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), depwatch_core::error::DepwatchError> {
//! use depwatch_core::config::DepwatchConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = DepwatchConfig::load("depwatch.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = DepwatchConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, DepwatchError};

/// 기본 원격 인덱스 주소
pub const DEFAULT_INDEX_URL: &str = "https://ossindex.sonatype.org/v2.0";

/// 기본 staleness 윈도우 (시간)
pub const DEFAULT_STALENESS_HOURS: u64 = 12;

/// depwatch 통합 설정
///
/// `depwatch.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepwatchConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 원격 취약점 인덱스 설정
    #[serde(default)]
    pub index: IndexConfig,
    /// 캐시 설정
    #[serde(default)]
    pub cache: CacheConfig,
    /// 매니페스트 스캔 설정
    #[serde(default)]
    pub scan: ScanConfig,
}

impl DepwatchConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DepwatchError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DepwatchError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DepwatchError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                DepwatchError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, DepwatchError> {
        toml::from_str(toml_str).map_err(|e| {
            DepwatchError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `DEPWATCH_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "DEPWATCH_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "DEPWATCH_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "DEPWATCH_GENERAL_DATA_DIR");

        // Index
        override_string(&mut self.index.url, "DEPWATCH_INDEX_URL");
        override_u64(
            &mut self.index.request_timeout_secs,
            "DEPWATCH_INDEX_REQUEST_TIMEOUT_SECS",
        );
        override_bool(
            &mut self.index.offline_fallback,
            "DEPWATCH_INDEX_OFFLINE_FALLBACK",
        );
        override_string(&mut self.index.user_agent, "DEPWATCH_INDEX_USER_AGENT");

        // Cache
        override_u64(
            &mut self.cache.staleness_hours,
            "DEPWATCH_CACHE_STALENESS_HOURS",
        );
        override_bool(&mut self.cache.persist, "DEPWATCH_CACHE_PERSIST");

        // Scan
        override_csv(&mut self.scan.ignore_dirs, "DEPWATCH_SCAN_IGNORE_DIRS");
        override_usize(&mut self.scan.max_file_size, "DEPWATCH_SCAN_MAX_FILE_SIZE");
        override_bool(&mut self.scan.include_dev, "DEPWATCH_SCAN_INCLUDE_DEV");
        override_bool(
            &mut self.scan.include_optional,
            "DEPWATCH_SCAN_INCLUDE_OPTIONAL",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), DepwatchError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if !(self.index.url.starts_with("http://") || self.index.url.starts_with("https://")) {
            return Err(invalid(
                "index.url",
                "must start with http:// or https://".to_owned(),
            ));
        }

        if self.index.request_timeout_secs == 0 {
            return Err(invalid(
                "index.request_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.cache.staleness_hours == 0 {
            return Err(invalid(
                "cache.staleness_hours",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.scan.max_file_size == 0 {
            return Err(invalid(
                "scan.max_file_size",
                "must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> DepwatchError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 영속 캐시와 응답 캐시를 저장할 디렉토리
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            data_dir: ".depwatch".to_owned(),
        }
    }
}

/// 원격 취약점 인덱스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// 인덱스 API 기본 주소
    pub url: String,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 연결 실패 시 저장된 응답으로 대체할지 여부
    pub offline_fallback: bool,
    /// User-Agent 헤더
    pub user_agent: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_INDEX_URL.to_owned(),
            request_timeout_secs: 30,
            offline_fallback: true,
            user_agent: format!("depwatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// 캐시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 캐시 항목이 stale로 간주되기까지의 시간
    pub staleness_hours: u64,
    /// 감사 결과를 data_dir에 영속 저장할지 여부
    pub persist: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            staleness_hours: DEFAULT_STALENESS_HOURS,
            persist: true,
        }
    }
}

/// 매니페스트 스캔 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// 탐색에서 제외할 디렉토리 이름
    pub ignore_dirs: Vec<String>,
    /// 매니페스트 최대 크기 (바이트)
    pub max_file_size: usize,
    /// devDependencies 포함 여부
    pub include_dev: bool,
    /// optionalDependencies 포함 여부
    pub include_optional: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: vec!["node_modules".to_owned(), ".git".to_owned()],
            max_file_size: 10 * 1024 * 1024, // 10MB
            include_dev: true,
            include_optional: true,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
