// Configuration types module
// Defines all configuration-related data structures

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
    pub media: MediaConfig,
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
///
/// Timeouts are in seconds; `0` disables the timeout.
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    /// Limit for receiving request headers, and separately the request body
    pub read_timeout: u64,
    /// Limit for producing the response of one request
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
}

impl PerformanceConfig {
    pub const fn read_timeout(&self) -> Option<Duration> {
        seconds(self.read_timeout)
    }

    pub const fn write_timeout(&self) -> Option<Duration> {
        seconds(self.write_timeout)
    }
}

const fn seconds(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

/// HTTP configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub server_name: String,
    pub enable_cors: bool,
    pub max_body_size: u64,
}

/// Media directory served by the catalog and the static media route
#[derive(Debug, Deserialize, Clone)]
pub struct MediaConfig {
    pub dir: PathBuf,
    /// Public URL prefix, e.g. `/media/`
    pub url_prefix: String,
    /// Recognized extensions without the leading dot
    pub extensions: Vec<String>,
    /// `Cache-Control` max-age for served media, in seconds
    pub cache_max_age: u32,
    /// Create `dir` at startup when it does not exist
    pub create_dir: bool,
}

/// External matcher process
#[derive(Debug, Deserialize, Clone)]
pub struct MatcherConfig {
    pub program: String,
    /// Leading arguments placed before the sticker list, e.g. the script path
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    pub timeout_ms: u64,
}

impl MatcherConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// JSON endpoint paths
#[derive(Debug, Deserialize, Clone)]
pub struct RoutesConfig {
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_match_path")]
    pub match_path: String,
}

#[allow(clippy::missing_const_for_fn)]
fn default_catalog_path() -> String {
    "/catalog".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_health_path() -> String {
    "/health".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_match_path() -> String {
    "/match".to_string()
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            health_path: default_health_path(),
            match_path: default_match_path(),
        }
    }
}
