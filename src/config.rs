//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{FloodgateError, Result};
use crate::ratelimit::{
    LimiterConfig, DEFAULT_MAX_REQUESTS, DEFAULT_MESSAGE, DEFAULT_WINDOW_MINUTES,
};

/// Prefix for environment overrides, e.g. `FLOODGATE_LIMIT__MAX_REQUESTS`.
const ENV_PREFIX: &str = "FLOODGATE";

/// Main configuration for the Floodgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Limiter parameters
    #[serde(default)]
    pub limit: LimitSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Decision service address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// How often expired windows are evicted, in seconds. Zero disables eviction.
    #[serde(default = "default_eviction_interval")]
    pub eviction_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            eviction_interval_secs: default_eviction_interval(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}

fn default_eviction_interval() -> u64 {
    60
}

/// Limiter parameters as they appear in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSettings {
    /// Window length in minutes
    #[serde(default = "default_minutes")]
    pub minutes: f64,

    /// Window length in milliseconds; takes precedence over `minutes`
    #[serde(default)]
    pub window_ms: Option<u64>,

    /// Requests allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Message returned with a denial
    #[serde(default)]
    pub message: Option<String>,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            minutes: default_minutes(),
            window_ms: None,
            max_requests: default_max_requests(),
            message: None,
        }
    }
}

fn default_minutes() -> f64 {
    DEFAULT_WINDOW_MINUTES as f64
}

fn default_max_requests() -> u64 {
    DEFAULT_MAX_REQUESTS
}

impl LimitSettings {
    /// Validate and convert into a limiter configuration.
    ///
    /// An empty message falls back to the default one.
    pub fn to_limiter_config(&self) -> Result<LimiterConfig> {
        let message = self
            .message
            .clone()
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

        match self.window_ms {
            Some(window_ms) => LimiterConfig::new(window_ms, self.max_requests, message),
            None => LimiterConfig::from_minutes(self.minutes, self.max_requests, message),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl FloodgateConfig {
    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from an optional file layered under `FLOODGATE_*`
    /// environment variables.
    ///
    /// Nested keys use `__` as the separator, so
    /// `FLOODGATE_SERVER__LISTEN_ADDR` sets `server.listen_addr`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Check that the limiter parameters are usable.
    pub fn validate(&self) -> Result<()> {
        self.limit.to_limiter_config().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    #[test]
    fn test_defaults() {
        let config = FloodgateConfig::default();

        assert_eq!(config.server.listen_addr, "127.0.0.1:8081".parse().unwrap());
        assert_eq!(config.server.eviction_interval_secs, 60);
        assert_eq!(config.logging.format, LogFormat::Text);

        let limiter = config.limit.to_limiter_config().unwrap();
        assert_eq!(limiter, LimiterConfig::default());
        assert_eq!(limiter.window_ms(), 15 * 60 * 1000);
        assert_eq!(limiter.max_requests(), 100);
        assert_eq!(limiter.message(), DEFAULT_MESSAGE);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
limit:
  minutes: 1
  max_requests: 3
  message: "Slow down"
logging:
  format: json
"#;
        let config = FloodgateConfig::from_yaml(yaml).unwrap();
        let limiter = config.limit.to_limiter_config().unwrap();

        assert_eq!(limiter.window_ms(), 60_000);
        assert_eq!(limiter.max_requests(), 3);
        assert_eq!(limiter.message(), "Slow down");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.server.listen_addr, default_listen_addr());
    }

    #[test]
    fn test_window_ms_overrides_minutes() {
        let yaml = r#"
limit:
  minutes: 30
  window_ms: 1500
"#;
        let config = FloodgateConfig::from_yaml(yaml).unwrap();
        let limiter = config.limit.to_limiter_config().unwrap();

        assert_eq!(limiter.window_ms(), 1500);
        assert_eq!(limiter.max_requests(), DEFAULT_MAX_REQUESTS);
    }

    #[test]
    fn test_empty_message_uses_default() {
        let config = FloodgateConfig::from_yaml("limit:\n  message: \"\"\n").unwrap();
        let limiter = config.limit.to_limiter_config().unwrap();

        assert_eq!(limiter.message(), DEFAULT_MESSAGE);
    }

    #[test]
    fn test_invalid_limits_fail_validation() {
        let config = FloodgateConfig::from_yaml("limit:\n  max_requests: 0\n").unwrap();
        assert!(matches!(config.validate(), Err(FloodgateError::Configuration(_))));

        let config = FloodgateConfig::from_yaml("limit:\n  minutes: -5\n").unwrap();
        assert!(config.validate().is_err());

        let config = FloodgateConfig::from_yaml("limit:\n  window_ms: 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_yaml_is_configuration_error() {
        let result = FloodgateConfig::from_yaml("limit: [unclosed");
        assert!(matches!(result, Err(FloodgateError::Configuration(_))));
    }

    /// Serializes tests that read `FLOODGATE_*` variables through `load`.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn test_load_from_file() {
        let _guard = env_lock();
        let path = std::env::temp_dir()
            .join(format!("floodgate-test-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "server:\n  listen_addr: 0.0.0.0:9000\n  eviction_interval_secs: 5\nlimit:\n  max_requests: 7\n",
        )
        .unwrap();

        let loaded = FloodgateConfig::load(Some(&path));
        let from_file = FloodgateConfig::from_file(&path);
        std::fs::remove_file(&path).unwrap();

        let loaded = loaded.unwrap();
        assert_eq!(loaded.server.listen_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(loaded.server.eviction_interval_secs, 5);
        assert_eq!(loaded.limit.max_requests, 7);
        assert_eq!(loaded.limit.minutes, 15.0);

        assert_eq!(from_file.unwrap().limit.max_requests, 7);
    }

    #[test]
    fn test_environment_overrides_defaults() {
        let _guard = env_lock();
        std::env::set_var("FLOODGATE_LIMIT__MAX_REQUESTS", "7");
        std::env::set_var("FLOODGATE_LIMIT__MINUTES", "2");
        std::env::set_var("FLOODGATE_SERVER__LISTEN_ADDR", "127.0.0.1:9500");

        let loaded = FloodgateConfig::load(None);

        std::env::remove_var("FLOODGATE_LIMIT__MAX_REQUESTS");
        std::env::remove_var("FLOODGATE_LIMIT__MINUTES");
        std::env::remove_var("FLOODGATE_SERVER__LISTEN_ADDR");

        let loaded = loaded.unwrap();
        assert_eq!(loaded.server.listen_addr, "127.0.0.1:9500".parse().unwrap());
        assert_eq!(loaded.server.eviction_interval_secs, 60);

        let limiter = loaded.limit.to_limiter_config().unwrap();
        assert_eq!(limiter.max_requests(), 7);
        assert_eq!(limiter.window_ms(), 2 * 60 * 1000);
        assert_eq!(limiter.message(), DEFAULT_MESSAGE);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let _guard = env_lock();
        let path = std::env::temp_dir().join("floodgate-does-not-exist.yaml");
        assert!(matches!(FloodgateConfig::load(Some(&path)), Err(FloodgateError::Settings(_))));
    }
}
