//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// depwatch -- dependency vulnerability audit for package.json and pom.xml.
///
/// Use `depwatch <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "depwatch", version, about, long_about = None)]
pub struct Cli {
    /// Path to the depwatch.toml configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// 설정 파일 기본 경로 (없으면 기본 설정 사용)
pub const DEFAULT_CONFIG_PATH: &str = "depwatch.toml";

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Audit the manifests under a project directory.
    Scan(ScanArgs),

    /// Inspect the persistent audit cache.
    Cache(CacheArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- scan ----

/// Audit manifests (package.json, pom.xml) found under a path.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Project directory or manifest file (default: current directory).
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Ignore cached results and resolve every manifest again.
    #[arg(long)]
    pub refresh: bool,

    /// Use a local index snapshot (JSON file or directory) instead of the remote index.
    #[arg(long)]
    pub index_file: Option<PathBuf>,

    /// Minimum finding severity to list (none, info, error).
    #[arg(long, default_value = "info")]
    pub min_severity: SeverityFilter,
}

/// Finding severity filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeverityFilter {
    /// Every dependency, including ones without known vulnerabilities.
    None,
    /// Dependencies with any known vulnerability.
    Info,
    /// Dependencies whose installed version is affected.
    Error,
}

// ---- cache ----

/// Inspect the persistent audit cache.
#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached audits with their staleness state.
    Show {
        /// Show only entries whose key contains this text.
        #[arg(long)]
        filter: Option<String>,
    },
}

// ---- config ----

/// Manage depwatch configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, index, cache, scan).
        #[arg(long)]
        section: Option<String>,
    },
}
