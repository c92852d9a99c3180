use super::app_config::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "covercache",
    version,
    about = "Two-tier cache for remote cover images",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Durable store directory.
    #[arg(long, value_name = "DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Maximum age of durable entries, in hours.
    #[arg(long, global = true)]
    pub ttl_hours: Option<u64>,

    /// Maximum concurrent downloads.
    #[arg(long, global = true)]
    pub max_concurrent_downloads: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Resolve images through the cache and print their local handles.
    Fetch {
        /// Image URLs.
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,
    },
    /// Print durable store statistics.
    Stats,
    /// Purge expired durable entries now.
    Cleanup,
    /// Empty both cache tiers.
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch() {
        let args = CliArgs::parse_from(["covercache", "fetch", "https://x/a.jpg", "https://x/b.jpg"]);
        assert_eq!(
            args.command,
            Command::Fetch {
                urls: vec!["https://x/a.jpg".into(), "https://x/b.jpg".into()]
            }
        );
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let args = CliArgs::parse_from(["covercache", "cleanup", "--log-level", "debug"]);
        assert_eq!(args.command, Command::Cleanup);
        assert_eq!(args.log_level, Some(LogLevel::Debug));
    }

    #[test]
    fn test_fetch_requires_url() {
        assert!(CliArgs::try_parse_from(["covercache", "fetch"]).is_err());
    }
}
