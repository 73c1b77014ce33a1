//! Integration tests for `depwatch config` command.
//!
//! Tests config validation and environment overrides with real TOML files.

use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use depwatch_auditor::AuditorConfig;
use depwatch_core::config::DepwatchConfig;
use depwatch_core::error::{ConfigError, DepwatchError};

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("depwatch.toml");
    fs::write(&path, content).expect("should write config");
    path
}

#[tokio::test]
#[serial]
async fn test_config_validate_valid_toml() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_config(
        &temp_dir,
        r#"
[general]
log_level = "debug"
log_format = "json"
data_dir = "/var/lib/depwatch"

[index]
url = "https://index.example.com/api"
request_timeout_secs = 10

[cache]
staleness_hours = 6
persist = false

[scan]
ignore_dirs = ["node_modules", "target"]
include_dev = false
"#,
    );

    let config = DepwatchConfig::load(&path)
        .await
        .expect("valid config should load");
    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.index.url, "https://index.example.com/api");
    assert_eq!(config.cache.staleness_hours, 6);
    assert!(!config.scan.include_dev);

    let auditor = AuditorConfig::from_core(&config);
    auditor.validate().expect("derived auditor config should be valid");
    assert_eq!(auditor.staleness_hours, 6);
    assert!(!auditor.persist);
    assert_eq!(auditor.ignore_dirs, vec!["node_modules", "target"]);
}

#[tokio::test]
#[serial]
async fn test_config_validate_malformed_toml() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_config(&temp_dir, "[general\nlog_level = \"info\"\n");

    let result = DepwatchConfig::load(&path).await;
    assert!(matches!(
        result,
        Err(DepwatchError::Config(ConfigError::ParseFailed { .. }))
    ));
}

#[tokio::test]
#[serial]
async fn test_config_validate_missing_file() {
    let result = DepwatchConfig::load("/nonexistent/depwatch.toml").await;
    assert!(matches!(
        result,
        Err(DepwatchError::Config(ConfigError::FileNotFound { .. }))
    ));
}

#[tokio::test]
#[serial]
async fn test_config_empty_file_uses_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_config(&temp_dir, "");

    let config = DepwatchConfig::load(&path)
        .await
        .expect("empty config should use defaults");
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.cache.staleness_hours, 12);
    assert!(config.cache.persist);
    assert!(config.scan.ignore_dirs.contains(&"node_modules".to_owned()));
}

#[tokio::test]
#[serial]
async fn test_config_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let cases = [
        ("[general]\nlog_level = \"verbose\"\n", "general.log_level"),
        ("[general]\nlog_format = \"xml\"\n", "general.log_format"),
        ("[index]\nurl = \"ftp://index\"\n", "index.url"),
        ("[cache]\nstaleness_hours = 0\n", "cache.staleness_hours"),
    ];

    for (content, expected_field) in cases {
        let path = write_config(&temp_dir, content);
        match DepwatchConfig::load(&path).await {
            Err(DepwatchError::Config(ConfigError::InvalidValue { field, .. })) => {
                assert_eq!(field, expected_field);
            }
            other => panic!("expected invalid value for {expected_field}, got {other:?}"),
        }
    }
}

#[tokio::test]
#[serial]
async fn test_env_overrides_take_precedence_over_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_config(&temp_dir, "[cache]\nstaleness_hours = 6\n");

    // SAFETY: serial 테스트에서만 환경변수를 변경
    unsafe {
        std::env::set_var("DEPWATCH_CACHE_STALENESS_HOURS", "24");
        std::env::set_var("DEPWATCH_SCAN_IGNORE_DIRS", "vendor,dist");
    }
    let result = DepwatchConfig::load(&path).await;
    unsafe {
        std::env::remove_var("DEPWATCH_CACHE_STALENESS_HOURS");
        std::env::remove_var("DEPWATCH_SCAN_IGNORE_DIRS");
    }

    let config = result.expect("config should load");
    assert_eq!(config.cache.staleness_hours, 24);
    assert_eq!(config.scan.ignore_dirs, vec!["vendor", "dist"]);
}

#[tokio::test]
#[serial]
async fn test_env_override_can_invalidate_config() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_config(&temp_dir, "");

    // SAFETY: serial 테스트에서만 환경변수를 변경
    unsafe { std::env::set_var("DEPWATCH_INDEX_URL", "index.example.com") };
    let result = DepwatchConfig::load(&path).await;
    unsafe { std::env::remove_var("DEPWATCH_INDEX_URL") };

    assert!(result.is_err(), "override without scheme should be rejected");
}

#[test]
fn test_unicode_data_dir() {
    let config = DepwatchConfig::parse("[general]\ndata_dir = \"/데이터/depwatch\"\n")
        .expect("unicode config should parse");
    let auditor = AuditorConfig::from_core(&config);
    assert!(auditor.cache_path().ends_with("audit-cache.json"));
    assert!(auditor.data_dir.to_string_lossy().contains("데이터"));
}
