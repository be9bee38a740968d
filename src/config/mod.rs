// Configuration module entry point
// Loads layered configuration and holds the shared runtime state

mod state;
mod types;

use std::net::SocketAddr;

pub use state::AppState;
pub use types::{
    Config, HttpConfig, LoggingConfig, MatcherConfig, MediaConfig, PerformanceConfig,
    RoutesConfig, ServerConfig,
};

/// Default config file name (without extension)
pub const DEFAULT_CONFIG_PATH: &str = "config";

/// Configuration loading failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from specified file path (without extension)
    ///
    /// Sources, lowest priority first: built-in defaults, the config file
    /// (optional), then `STICKER__SECTION__KEY` environment variables.
    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("STICKER").separator("__"))
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3001)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("http.server_name", "sticker-match/0.1")?
            .set_default("http.enable_cors", true)?
            .set_default("http.max_body_size", 1_048_576)? // 1MB
            .set_default("media.dir", "midi-files")?
            .set_default("media.url_prefix", "/media/")?
            .set_default("media.extensions", vec!["mid", "midi"])?
            .set_default("media.cache_max_age", 31_536_000)? // 1 year
            .set_default("media.create_dir", true)?
            .set_default("matcher.program", "python3")?
            .set_default("matcher.args", vec!["match.py"])?
            .set_default("matcher.timeout_ms", 10_000)?
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.matcher.program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "matcher.program must not be empty".to_string(),
            ));
        }
        if self.matcher.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "matcher.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(write_timeout) = self.performance.write_timeout() {
            if self.matcher.timeout() >= write_timeout {
                return Err(ConfigError::Invalid(format!(
                    "matcher.timeout_ms ({}) must be below performance.write_timeout ({}s)",
                    self.matcher.timeout_ms, self.performance.write_timeout
                )));
            }
        }
        let prefix = &self.media.url_prefix;
        if !prefix.starts_with('/') || !prefix.ends_with('/') {
            return Err(ConfigError::Invalid(format!(
                "media.url_prefix must start and end with '/': {prefix}"
            )));
        }
        Ok(())
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}
