//! 에러 타입 — 도메인별 에러 정의

/// depwatch 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum DepwatchError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 플러그인 생명주기 에러
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// 의존성 감사 에러
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,
}

/// 플러그인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// 현재 상태에서 허용되지 않는 전환
    #[error("plugin '{name}' cannot {action} in state '{state}'")]
    InvalidState {
        name: String,
        state: String,
        action: String,
    },
}

/// 의존성 감사 에러
///
/// 원격 인덱스 연결, 매니페스트 파싱, 응답 형식 불일치를 구분합니다.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// 원격 인덱스에 연결할 수 없음
    #[error("connectivity failure: {0}")]
    Connectivity(String),

    /// 매니페스트 또는 버전 파싱 실패
    #[error("parse failed: {0}")]
    ParseFailed(String),

    /// 원격 응답이 요청과 위치 대응되지 않음
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// 그 밖의 해석 실패
    #[error("resolution failed: {0}")]
    ResolveFailed(String),
}
