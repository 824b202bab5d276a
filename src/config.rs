//! Configuration module for feedsum.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{FeedError, Result};

/// Synchronization cycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Interval between background sync cycles in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Number of summarization calls allowed in flight at once.
    #[serde(default = "default_summary_concurrency")]
    pub summary_concurrency: usize,
    /// Maximum retry attempts for a failed summary within one retry window.
    #[serde(default = "default_max_retries_per_window")]
    pub max_retries_per_window: u32,
    /// Length of the retry window in seconds.
    #[serde(default = "default_retry_window")]
    pub retry_window_secs: u64,
}

fn default_poll_interval() -> u64 {
    300 // 5 minutes
}

fn default_summary_concurrency() -> usize {
    1
}

fn default_max_retries_per_window() -> u32 {
    3
}

fn default_retry_window() -> u64 {
    3600 // 1 hour
}

impl SyncConfig {
    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Retry window as a `Duration`.
    pub fn retry_window(&self) -> Duration {
        Duration::from_secs(self.retry_window_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            summary_concurrency: default_summary_concurrency(),
            max_retries_per_window: default_max_retries_per_window(),
            retry_window_secs: default_retry_window(),
        }
    }
}

/// Feed download configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Maximum items considered per feed per cycle.
    #[serde(default = "default_max_items")]
    pub max_items_per_feed: usize,
    /// Maximum description length in characters.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Reject loopback, private and reserved hosts.
    #[serde(default = "default_block_private_hosts")]
    pub block_private_hosts: bool,
    /// Fallback proxy used when a direct fetch fails.
    ///
    /// `{url}` is replaced with the percent-encoded feed URL. The proxy must
    /// answer with JSON `{"contents": "..."}`. Empty disables the fallback.
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
}

fn default_max_feed_size() -> u64 {
    crate::feed::MAX_FEED_SIZE
}

fn default_max_items() -> usize {
    crate::feed::MAX_ITEMS_PER_FEED
}

fn default_max_content_length() -> usize {
    crate::feed::MAX_DESCRIPTION_LENGTH
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    20
}

fn default_total_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_block_private_hosts() -> bool {
    true
}

fn default_proxy_url() -> String {
    "https://api.allorigins.win/get?url={url}".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_feed_size_bytes: default_max_feed_size(),
            max_items_per_feed: default_max_items(),
            max_content_length: default_max_content_length(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            block_private_hosts: default_block_private_hosts(),
            proxy_url: default_proxy_url(),
        }
    }
}

/// Summarization service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SummarizerConfig {
    /// Endpoint accepting `POST {"text": ...}`.
    #[serde(default)]
    pub endpoint: String,
    /// Optional bearer token.
    #[serde(default)]
    pub api_token: String,
    /// Per-article timeout in seconds.
    #[serde(default = "default_summarizer_timeout")]
    pub timeout_secs: u64,
    /// Longest input sent to the service, in characters.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    /// Upper bound on summary length (model tokens).
    #[serde(default = "default_max_length")]
    pub max_length: u32,
    /// Lower bound on summary length (model tokens).
    #[serde(default = "default_min_length")]
    pub min_length: u32,
}

fn default_summarizer_timeout() -> u64 {
    60
}

fn default_max_input_chars() -> usize {
    20000
}

fn default_max_length() -> u32 {
    142
}

fn default_min_length() -> u32 {
    56
}

impl SummarizerConfig {
    /// Per-article timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_token: String::new(),
            timeout_secs: default_summarizer_timeout(),
            max_input_chars: default_max_input_chars(),
            max_length: default_max_length(),
            min_length: default_min_length(),
        }
    }
}

/// Persisted state configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the JSON state files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/feedsum.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Sync cycle configuration.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Feed download configuration.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Summarizer configuration.
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FeedError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FeedError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FEEDSUM_SUMMARIZER_URL`: summarizer endpoint
    /// - `FEEDSUM_SUMMARIZER_TOKEN`: summarizer bearer token
    /// - `FEEDSUM_DATA_DIR`: state directory
    pub fn apply_env_overrides(&mut self) {
        if let Some(endpoint) = non_empty_env("FEEDSUM_SUMMARIZER_URL") {
            self.summarizer.endpoint = endpoint;
        }
        if let Some(token) = non_empty_env("FEEDSUM_SUMMARIZER_TOKEN") {
            self.summarizer.api_token = token;
        }
        if let Some(dir) = non_empty_env("FEEDSUM_DATA_DIR") {
            self.storage.data_dir = dir;
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - the poll interval or retry window is zero
    /// - summary concurrency is zero
    /// - the summarizer endpoint is set but is not an http(s) URL
    pub fn validate(&self) -> Result<()> {
        if self.sync.poll_interval_secs == 0 {
            return Err(FeedError::Config(
                "sync.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.sync.retry_window_secs == 0 {
            return Err(FeedError::Config(
                "sync.retry_window_secs must be greater than zero".to_string(),
            ));
        }
        if self.sync.summary_concurrency == 0 {
            return Err(FeedError::Config(
                "sync.summary_concurrency must be at least 1".to_string(),
            ));
        }
        if self.fetch.max_items_per_feed == 0 {
            return Err(FeedError::Config(
                "fetch.max_items_per_feed must be at least 1".to_string(),
            ));
        }
        if self.summarizer.timeout_secs == 0 {
            return Err(FeedError::Config(
                "summarizer.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !self.summarizer.endpoint.is_empty() {
            let parsed = url::Url::parse(&self.summarizer.endpoint)
                .map_err(|e| FeedError::Config(format!("summarizer.endpoint: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(FeedError::Config(format!(
                    "summarizer.endpoint must be http or https, got {}",
                    parsed.scheme()
                )));
            }
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
