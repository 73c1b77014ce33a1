//! 감사 모듈 에러 타입
//!
//! [`AuditorError`]는 의존성 감사 과정에서 발생할 수 있는 모든 에러를 나타냅니다.
//! `From<AuditorError> for DepwatchError` 구현을 통해 `?` 연산자로
//! 상위 에러 타입으로 전파됩니다.
//!
//! # 에러 카테고리
//!
//! - **연결 실패**: `Connectivity` — 배치를 중단하고 서킷 브레이커를 엽니다
//! - **응답 불일치**: `ProtocolMismatch` — 해당 배치의 결과만 버립니다
//! - **데이터 오류**: `ManifestParse`, `VersionParse` — 해당 항목만 건너뜁니다
//! - **원격 응답 오류**: `Index`
//! - **저장소**: `Store`, `Io`, `FileTooBig`
//! - **설정/채널**: `Config`, `Channel`
//!
//! 찾을 수 없는 패키지는 에러가 아니라 `None`으로 표현합니다.

use depwatch_core::error::{AuditError, ConfigError, DepwatchError};

/// 의존성 감사 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum AuditorError {
    /// 원격 인덱스에 도달할 수 없음
    #[error("connectivity error: {endpoint}: {reason}")]
    Connectivity {
        /// 요청 대상
        endpoint: String,
        /// 실패 사유
        reason: String,
    },

    /// 응답 목록의 길이(또는 순서)가 요청과 대응되지 않음
    #[error("protocol mismatch in {call}: expected {expected} results, got {actual}")]
    ProtocolMismatch {
        /// 원격 호출 이름
        call: String,
        /// 요청 항목 수
        expected: usize,
        /// 응답 항목 수
        actual: usize,
    },

    /// 매니페스트 파싱 실패
    #[error("manifest parse error: {path}: {reason}")]
    ManifestParse {
        /// 매니페스트 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 버전 또는 버전 제약 파싱 실패
    #[error("version parse error: '{version}': {reason}")]
    VersionParse {
        /// 파싱 대상 문자열
        version: String,
        /// 실패 사유
        reason: String,
    },

    /// 연결은 되었으나 원격 응답을 사용할 수 없음 (HTTP 상태, 디코딩 실패)
    #[error("index error: {0}")]
    Index(String),

    /// 속성 저장소 읽기/쓰기 실패
    #[error("store error: {0}")]
    Store(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 또는 스케줄러 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 파일 I/O 에러
    #[error("io error: {path}: {source}")]
    Io {
        /// 관련 파일 경로
        path: String,
        /// 원본 I/O 에러
        source: std::io::Error,
    },

    /// 파일 크기 초과
    #[error("file too large: {path}: {size} bytes (max: {max})")]
    FileTooBig {
        /// 파일 경로
        path: String,
        /// 실제 파일 크기 (바이트)
        size: usize,
        /// 최대 허용 크기 (바이트)
        max: usize,
    },
}

impl AuditorError {
    /// 연결 실패인지 여부
    ///
    /// 연결 실패는 진행 중인 배치를 중단하고 서킷 브레이커를 엽니다.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// 항목 단위로 건너뛰어야 하는 데이터 오류인지 여부
    pub fn is_data_error(&self) -> bool {
        matches!(self, Self::ManifestParse { .. } | Self::VersionParse { .. })
    }

    /// 연결 실패 에러를 생성합니다.
    pub fn connectivity(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connectivity {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }
}

impl From<AuditorError> for DepwatchError {
    fn from(err: AuditorError) -> Self {
        match err {
            AuditorError::Connectivity { .. } => {
                DepwatchError::Audit(AuditError::Connectivity(err.to_string()))
            }
            AuditorError::ProtocolMismatch { .. } => {
                DepwatchError::Audit(AuditError::ProtocolMismatch(err.to_string()))
            }
            AuditorError::ManifestParse { .. } | AuditorError::VersionParse { .. } => {
                DepwatchError::Audit(AuditError::ParseFailed(err.to_string()))
            }
            AuditorError::Config { field, reason } => {
                DepwatchError::Config(ConfigError::InvalidValue { field, reason })
            }
            AuditorError::Io { source, .. } => DepwatchError::Io(source),
            other => DepwatchError::Audit(AuditError::ResolveFailed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_error_display() {
        let err = AuditorError::connectivity("http://localhost:1/scm/1", "connection refused");
        let msg = err.to_string();
        assert!(msg.contains("connection refused"));
        assert!(err.is_connectivity());
        assert!(!err.is_data_error());
    }

    #[test]
    fn protocol_mismatch_display() {
        let err = AuditorError::ProtocolMismatch {
            call: "find_scms".to_owned(),
            expected: 2,
            actual: 1,
        };
        assert_eq!(
            err.to_string(),
            "protocol mismatch in find_scms: expected 2 results, got 1"
        );
    }

    #[test]
    fn data_errors_are_classified() {
        let parse = AuditorError::ManifestParse {
            path: "package.json".to_owned(),
            reason: "expected value".to_owned(),
        };
        let version = AuditorError::VersionParse {
            version: "^^1".to_owned(),
            reason: "unexpected operator".to_owned(),
        };
        assert!(parse.is_data_error());
        assert!(version.is_data_error());
    }

    #[test]
    fn converts_connectivity_to_audit_error() {
        let err: DepwatchError = AuditorError::connectivity("index", "timed out").into();
        assert!(matches!(
            err,
            DepwatchError::Audit(AuditError::Connectivity(_))
        ));
    }

    #[test]
    fn converts_config_to_config_error() {
        let err: DepwatchError = AuditorError::Config {
            field: "staleness_window_secs".to_owned(),
            reason: "must be greater than 0".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            DepwatchError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn converts_io_error_preserving_source() {
        let err: DepwatchError = AuditorError::Io {
            path: "/tmp/x".to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        }
        .into();
        assert!(matches!(err, DepwatchError::Io(_)));
    }
}
