#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod plugin;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{AuditError, ConfigError, DepwatchError, PipelineError, PluginError};

// 설정
pub use config::DepwatchConfig;

// 이벤트
pub use event::{Event, EventMetadata};

// 플러그인
pub use plugin::{HealthStatus, Plugin, PluginInfo, PluginState};

// 도메인 타입
pub use types::{Ecosystem, FindingSeverity};
