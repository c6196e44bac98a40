//! CLI argument definitions for logwatch-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use logwatch_daemon::orchestrator::ConfigOverrides;

/// Log tailing and classification daemon.
///
/// Watches log directories, classifies new lines by severity and emits
/// periodic summaries and pinned-key alerts.
#[derive(Parser, Debug)]
#[command(name = "logwatch-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to logwatch.toml configuration file.
    #[arg(short, long, default_value = "/etc/logwatch/logwatch.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Read every discovered file from the beginning instead of tailing from now.
    #[arg(long)]
    pub replay: bool,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Overrides that are re-applied on every config (re)load.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            log_level: self.log_level.clone(),
            log_format: self.log_format.clone(),
            replay: self.replay,
        }
    }
}
