//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::HandlerConfig;
use store::{CacheConfig, RetryPolicy};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `REQUEST_TIMEOUT_MS`: deadline of each command (default: `5000`)
/// - `CACHE_TTL_SECS`: expiry of cached rows (default: `86400`)
/// - `WRITE_CONFLICT_BACKOFF_MS`: pause between conflicting inserts (default: `5`)
/// - `DATABASE_URL`: when set, groups are stored in Postgres
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
    pub write_conflict_backoff: Duration,
    pub database_url: Option<String>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: env_or("LOG_FORMAT", defaults.log_format),
            request_timeout: Duration::from_millis(env_or("REQUEST_TIMEOUT_MS", 5000)),
            cache_ttl: Duration::from_secs(env_or("CACHE_TTL_SECS", 86_400)),
            write_conflict_backoff: Duration::from_millis(env_or("WRITE_CONFLICT_BACKOFF_MS", 5)),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            request_timeout: self.request_timeout,
            retry: RetryPolicy {
                backoff: self.write_conflict_backoff,
            },
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: self.cache_ttl,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            request_timeout: Duration::from_millis(5000),
            cache_ttl: Duration::from_secs(86_400),
            write_conflict_backoff: Duration::from_millis(5),
            database_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_library_configs() {
        let config = Config {
            request_timeout: Duration::from_millis(250),
            write_conflict_backoff: Duration::from_millis(2),
            cache_ttl: Duration::from_secs(60),
            ..Config::default()
        };
        let handler = config.handler_config();
        assert_eq!(handler.request_timeout, Duration::from_millis(250));
        assert_eq!(handler.retry.backoff, Duration::from_millis(2));
        assert_eq!(config.cache_config().ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
