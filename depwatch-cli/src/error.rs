//! CLI-specific error types and exit code mapping

use depwatch_auditor::AuditorError;
use depwatch_core::error::DepwatchError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The remote index could not be reached and nothing was cached.
    #[error("index unreachable: {0}")]
    Connectivity(String),

    /// The scan completed and found affected dependencies.
    #[error("{0}")]
    Vulnerable(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from depwatch-core.
    #[error("{0}")]
    Core(DepwatchError),

    /// Audit domain error.
    #[error("audit error: {0}")]
    Audit(AuditorError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                              |
    /// |------|--------------------------------------|
    /// | 0    | Success                              |
    /// | 1    | General / command error              |
    /// | 2    | Configuration error                  |
    /// | 3    | Remote index unreachable             |
    /// | 4    | Affected dependencies found          |
    /// | 10   | IO error                             |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Connectivity(_) => 3,
            Self::Vulnerable(_) => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) | Self::Audit(_) => 1,
        }
    }
}

impl From<DepwatchError> for CliError {
    fn from(e: DepwatchError) -> Self {
        match e {
            DepwatchError::Config(_) => Self::Config(e.to_string()),
            DepwatchError::Io(io) => Self::Io(io),
            other => Self::Core(other),
        }
    }
}

impl From<AuditorError> for CliError {
    fn from(e: AuditorError) -> Self {
        match e {
            AuditorError::Connectivity { .. } => Self::Connectivity(e.to_string()),
            AuditorError::Config { .. } => Self::Config(e.to_string()),
            AuditorError::Io { source, .. } => Self::Io(source),
            other => Self::Audit(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depwatch_core::error::ConfigError;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Config("x".to_owned()).exit_code(), 2);
        assert_eq!(CliError::Command("x".to_owned()).exit_code(), 1);
        assert_eq!(CliError::Connectivity("x".to_owned()).exit_code(), 3);
        assert_eq!(CliError::Vulnerable("x".to_owned()).exit_code(), 4);
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert_eq!(CliError::Io(io_err).exit_code(), 10);
    }

    #[test]
    fn test_exit_code_json_serialize_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid json")
            .expect_err("should fail parsing");
        assert_eq!(CliError::JsonSerialize(json_err).exit_code(), 1);
    }

    #[test]
    fn test_from_core_config_error_is_config() {
        let core_err = DepwatchError::Config(ConfigError::FileNotFound {
            path: "depwatch.toml".to_owned(),
        });
        let cli_err: CliError = core_err.into();
        assert_eq!(cli_err.exit_code(), 2);
        assert!(cli_err.to_string().contains("depwatch.toml"));
    }

    #[test]
    fn test_from_auditor_connectivity_error() {
        let err: CliError = AuditorError::connectivity("https://index", "timed out").into();
        assert!(matches!(err, CliError::Connectivity(_)));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_from_auditor_io_error_keeps_source() {
        let err: CliError = AuditorError::Io {
            path: "package.json".to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        match err {
            CliError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied),
            _ => panic!("expected Io error variant"),
        }
    }

    #[test]
    fn test_from_auditor_parse_error_is_audit() {
        let err: CliError = AuditorError::ManifestParse {
            path: "pom.xml".to_owned(),
            reason: "unexpected eof".to_owned(),
        }
        .into();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("pom.xml"));
    }
}
