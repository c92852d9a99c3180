//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::args::CliArgs;
use crate::infrastructure::image::ImageCacheConfig;

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration, from `config.toml` and CLI overrides.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log file path. Logs go to stderr when unset.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Image cache configuration.
    #[serde(default)]
    pub cache: ImageCacheConfig,
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.cache.dir = Some(cache_dir.clone());
        }
        if let Some(ttl_hours) = args.ttl_hours {
            self.cache.ttl_hours = ttl_hours;
        }
        if let Some(max) = args.max_concurrent_downloads {
            self.cache.max_concurrent_downloads = max;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_config_with_cache_table() {
        let toml_content = r#"
            log_level = "debug"

            [cache]
            dir = "/tmp/covers"
            ttl_hours = 6
        "#;

        let config: AppConfig = toml::from_str(toml_content).expect("Failed to parse config");

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.cache.dir, Some(PathBuf::from("/tmp/covers")));
        assert_eq!(config.cache.ttl_hours, 6);
        assert_eq!(config.cache.max_concurrent_downloads, 4);
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.log_path.is_none());
        assert_eq!(config.cache.ttl_hours, 24);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config: AppConfig = toml::from_str("[cache]\nttl_hours = 6\n").unwrap();
        let args = CliArgs::parse_from([
            "covercache",
            "--ttl-hours",
            "48",
            "--cache-dir",
            "/var/cache/covers",
            "stats",
        ]);

        config.merge_with_args(&args);

        assert_eq!(config.cache.ttl_hours, 48);
        assert_eq!(config.cache.dir, Some(PathBuf::from("/var/cache/covers")));
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_config_flag_selects_file_then_overrides_apply() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("covers.toml");
        std::fs::write(&custom, "log_level = \"warn\"\n[cache]\nttl_hours = 2\n").unwrap();
        let args = CliArgs::parse_from([
            "covercache",
            "--config",
            custom.to_str().unwrap(),
            "--ttl-hours",
            "3",
            "cleanup",
        ]);

        let storage = crate::infrastructure::config::StorageManager::with_dir(dir.path().join("default"));
        let mut config = storage.load_config(args.config.as_deref()).unwrap();
        config.merge_with_args(&args);

        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.cache.ttl_hours, 3);
        assert!(!dir.path().join("default").exists());
    }
}
