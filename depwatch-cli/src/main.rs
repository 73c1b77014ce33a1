//! depwatch CLI -- dependency vulnerability auditing from the command line.
//!
//! # Usage
//!
//! ```text
//! depwatch scan [PATH] [--refresh] [--index-file FILE] [--min-severity LEVEL]
//! depwatch cache show [--filter TEXT]
//! depwatch config validate
//! depwatch config show [--section SECTION]
//! ```
//!
//! # Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success, no affected dependencies |
//! | 1 | General error |
//! | 2 | Configuration error |
//! | 3 | Index unreachable and no cached results |
//! | 4 | Affected dependencies found |
//! | 10 | I/O error |

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;

use depwatch_core::config::GeneralConfig;

use cli::{Cli, Commands};
use output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // 로깅 설정만 먼저 읽음. 설정 에러는 명령 실행 시 다시 보고됨
    let mut general = commands::load_effective_config(&cli.config)
        .await
        .map(|c| c.general)
        .unwrap_or_else(|_| GeneralConfig::default());
    if let Some(ref level) = cli.log_level {
        general.log_level = level.clone();
    }
    if let Err(e) = logging::init_tracing(&general) {
        eprintln!("warning: {e:#}");
    }

    tracing::debug!(config = %cli.config.display(), "depwatch starting");

    let writer = OutputWriter::new(cli.output);
    let result = match cli.command {
        Commands::Scan(args) => commands::scan::execute(args, &cli.config, &writer).await,
        Commands::Cache(args) => commands::cache::execute(args, &cli.config, &writer).await,
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}
