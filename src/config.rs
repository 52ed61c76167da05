//! Configuration management for linesink

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::{
    Severity, SinkConfig, DEFAULT_FLUSH_THRESHOLD, DEFAULT_MAX_FILE_LINES, DEFAULT_MAX_LINES,
    DEFAULT_RETENTION_DAYS,
};

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "LINESINK_CONFIG";

/// Default config file location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "data/conf/config.toml";

/// Log sink settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    /// Minimum severity: DEBUG, INFO, WARNING/WARN, ERROR or CRITICAL/FATAL
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory of the log file, relative to `work_dir`
    #[serde(default = "default_output_path")]
    pub output_path: String,

    /// Log file name
    #[serde(default = "default_output_file")]
    pub output_file: String,

    /// Lines kept in memory for queries (default: 1000)
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,

    /// Seconds between background flushes (default: 5, minimum: 1)
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Unwritten lines that trigger an early flush (default: 50)
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Lines in the log file before it is rotated (default: 10000)
    #[serde(default = "default_max_file_lines")]
    pub max_file_lines: usize,

    /// Milliseconds a flush waits for the buffer lock before skipping (default: 500)
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Milliseconds shutdown waits for the flush worker (default: 2000)
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    /// Days to keep rotated log files (default: 7)
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,

    /// Echo log lines to stderr
    #[serde(default = "default_console")]
    pub console: bool,
}

/// HTTP query endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Service name
    #[serde(default = "default_name")]
    pub name: String,

    /// Base directory for relative paths
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

fn default_name() -> String {
    "linesink".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_output_path() -> String {
    "data/".to_string()
}

fn default_output_file() -> String {
    "log.txt".to_string()
}

fn default_max_lines() -> usize {
    DEFAULT_MAX_LINES
}

fn default_flush_interval_secs() -> u64 {
    5
}

fn default_flush_threshold() -> usize {
    DEFAULT_FLUSH_THRESHOLD
}

fn default_max_file_lines() -> usize {
    DEFAULT_MAX_FILE_LINES
}

fn default_lock_timeout_ms() -> u64 {
    500
}

fn default_join_timeout_ms() -> u64 {
    2000
}

fn default_retention_days() -> u64 {
    DEFAULT_RETENTION_DAYS
}

fn default_console() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7210
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            output_path: default_output_path(),
            output_file: default_output_file(),
            max_lines: default_max_lines(),
            flush_interval_secs: default_flush_interval_secs(),
            flush_threshold: default_flush_threshold(),
            max_file_lines: default_max_file_lines(),
            lock_timeout_ms: default_lock_timeout_ms(),
            join_timeout_ms: default_join_timeout_ms(),
            retention_days: default_retention_days(),
            console: default_console(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            work_dir: default_work_dir(),
            log: LogConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl LogConfig {
    /// Parse the configured minimum severity
    pub fn min_level(&self) -> Result<Severity> {
        self.log_level
            .parse()
            .with_context(|| format!("Invalid log.log_level '{}'", self.log_level))
    }

    /// Path of the log file under `work_dir`
    pub fn file_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(&self.output_path).join(&self.output_file)
    }

    /// Build the sink settings for a log file under `work_dir`
    pub fn sink_config(&self, work_dir: &Path) -> Result<SinkConfig> {
        Ok(SinkConfig {
            min_level: self.min_level()?,
            file_path: self.file_path(work_dir),
            max_lines: self.max_lines,
            flush_interval: Duration::from_secs(self.flush_interval_secs.max(1)),
            flush_threshold: self.flush_threshold,
            max_file_lines: self.max_file_lines,
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            join_timeout: Duration::from_millis(self.join_timeout_ms),
        })
    }
}

impl ApiConfig {
    /// Parse host and port into a listen address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid api address {}:{}", self.host, self.port))
    }
}

impl Config {
    /// Load configuration from `path`, writing the defaults there if it doesn't exist
    ///
    /// An existing file is rewritten with any missing keys filled in from the
    /// defaults. A file that fails to parse is left untouched.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
            let merged = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            if merged != content {
                std::fs::write(path, merged).context("Failed to write config file")?;
            }
            Ok(config)
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Build the sink settings for this configuration
    pub fn sink_config(&self) -> Result<SinkConfig> {
        self.log.sink_config(&self.work_dir)
    }
}

/// Get the path to the config file
pub fn config_file_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
