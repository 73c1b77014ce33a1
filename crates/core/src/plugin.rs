//! 플러그인 생명주기 — 명시적으로 생성되고 활성화/비활성화되는 서비스
//!
//! 전역 싱글톤 대신 호스트가 서비스를 직접 생성하고
//! [`Plugin`] trait의 `init → start → stop` 순서로 수명을 관리합니다.
//!
//! # 생명주기
//! ```text
//! Created → init() → Initialized → start() → Running → stop() → Stopped
//! ```

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::{DepwatchError, PluginError};

/// 플러그인 메타데이터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    /// 플러그인 고유 이름 (예: `"auditor"`)
    pub name: String,
    /// 플러그인 버전
    pub version: String,
    /// 플러그인 설명
    pub description: String,
}

/// 플러그인 생명주기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginState {
    /// 생성됨 (init 전)
    Created,
    /// 초기화 완료 (start 가능)
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
    /// 오류 상태
    Failed,
}

impl PluginState {
    /// `action`이 현재 상태에서 허용되는지 검사합니다.
    ///
    /// 허용되지 않으면 [`PluginError::InvalidState`]를 반환합니다.
    pub fn ensure(self, name: &str, action: &str, allowed: &[PluginState]) -> Result<(), DepwatchError> {
        if allowed.contains(&self) {
            Ok(())
        } else {
            Err(PluginError::InvalidState {
                name: name.to_owned(),
                state: self.to_string(),
                action: action.to_owned(),
            }
            .into())
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Initialized => write!(f, "initialized"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// 플러그인 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 일부 기능이 제한됨 (예: 오프라인)
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 여부
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 모든 서비스가 구현하는 플러그인 trait
///
/// # 구현 예시
/// ```ignore
/// impl Plugin for MyService {
///     fn info(&self) -> &PluginInfo { &self.info }
///     fn state(&self) -> PluginState { self.state }
///
///     async fn init(&mut self) -> Result<(), DepwatchError> {
///         self.state = PluginState::Initialized;
///         Ok(())
///     }
///     // ...
/// }
/// ```
pub trait Plugin: Send + Sync {
    /// 플러그인 메타데이터를 반환합니다.
    fn info(&self) -> &PluginInfo;

    /// 현재 플러그인 상태를 반환합니다.
    fn state(&self) -> PluginState;

    /// 플러그인을 초기화합니다.
    ///
    /// `Created` 상태에서만 호출 가능합니다.
    fn init(&mut self) -> impl Future<Output = Result<(), DepwatchError>> + Send;

    /// 플러그인을 시작합니다.
    ///
    /// `Initialized` 또는 `Stopped` 상태에서만 호출 가능합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), DepwatchError>> + Send;

    /// 플러그인을 정지합니다.
    ///
    /// 진행 중인 백그라운드 작업을 취소하고 종료를 기다립니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), DepwatchError>> + Send;

    /// 플러그인의 건강 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}
