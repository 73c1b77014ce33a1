//! Command handlers -- one module per subcommand

pub mod cache;
pub mod config;
pub mod scan;

use std::path::Path;

use depwatch_core::config::DepwatchConfig;
use depwatch_core::error::{ConfigError, DepwatchError};
use tracing::debug;

use crate::cli::DEFAULT_CONFIG_PATH;
use crate::error::CliError;

/// 유효 설정을 로드합니다.
///
/// 기본 경로의 파일이 없으면 기본 설정에 환경변수 오버라이드만 적용합니다.
/// 명시적으로 지정한 경로의 파일이 없으면 에러입니다.
pub async fn load_effective_config(path: &Path) -> Result<DepwatchConfig, CliError> {
    match DepwatchConfig::load(path).await {
        Ok(config) => Ok(config),
        Err(DepwatchError::Config(ConfigError::FileNotFound { .. }))
            if path == Path::new(DEFAULT_CONFIG_PATH) =>
        {
            debug!(path = %path.display(), "no config file, using defaults");
            let mut config = DepwatchConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}
