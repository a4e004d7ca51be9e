//! Command-line arguments (§6.1). Mirrors `binlog_cli`'s `--debug` flag
//! convention but drops its `--format` option — configuration is
//! JSON-only here, so there is nothing left for `--format` to select.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "cdc-cli")]
#[command(version)]
#[command(about = "Multi-source change-data-capture pipeline")]
pub struct CliArgs {
    /// Path to the JSON configuration file.
    pub config: PathBuf,

    /// Raise log verbosity to debug regardless of the config file's level.
    #[arg(short, long, default_value_t = false)]
    pub debug: bool,
}
