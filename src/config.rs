use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::broker::market_data::CandleInterval;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// REST API base URL, e.g. https://api.example.com/api/v1
    pub base_url: String,
    /// Account API key (FOLIO_BROKER__API_KEY)
    #[serde(default)]
    pub api_key: String,
    /// Account user key (FOLIO_BROKER__USER_KEY)
    #[serde(default)]
    pub user_key: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum attempts per request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Catalog response cache TTL in seconds (0 disables)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_cache_ttl_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL: mem:// for in-process, http(s):// for a remote store
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Timeframe label stored with each candle (e.g. "1d")
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    /// Candle interval requested from the API
    #[serde(default)]
    pub interval: CandleInterval,
    /// Candles fetched per instrument (1..=1000)
    #[serde(default = "default_candle_count")]
    pub candle_count: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeframe: default_timeframe(),
            interval: CandleInterval::OneDay,
            candle_count: default_candle_count(),
        }
    }
}

fn default_timeframe() -> String {
    "1d".to_string()
}

fn default_candle_count() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("broker.base_url", "")?
            .set_default("broker.api_key", "")?
            .set_default("broker.user_key", "")?
            .set_default("broker.timeout_secs", 10)?
            .set_default("broker.max_retries", 3)?
            .set_default("broker.backoff_ms", 500)?
            .set_default("broker.cache_ttl_secs", 300)?
            .set_default("database.url", "mem://")?
            .set_default("database.namespace", "folio")?
            .set_default("database.database", "folio")?
            .set_default("database.username", "root")?
            .set_default("database.password", "root")?
            .set_default("pipeline.timeframe", "1d")?
            .set_default("pipeline.interval", "OneDay")?
            .set_default("pipeline.candle_count", 100)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("FOLIO_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (FOLIO_BROKER__API_KEY, etc.)
            .add_source(
                Environment::with_prefix("FOLIO")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.broker.base_url.is_empty() {
            errors.push("broker.base_url must be set".to_string());
        } else if !self.broker.base_url.starts_with("http://")
            && !self.broker.base_url.starts_with("https://")
        {
            errors.push("broker.base_url must be an http(s) URL".to_string());
        }

        if self.broker.api_key.is_empty() {
            errors.push("broker.api_key must be set".to_string());
        }
        if self.broker.user_key.is_empty() {
            errors.push("broker.user_key must be set".to_string());
        }
        if self.broker.max_retries == 0 {
            errors.push("broker.max_retries must be at least 1".to_string());
        }

        if self.database.url.is_empty() {
            errors.push("database.url must be set".to_string());
        }

        if self.pipeline.timeframe.is_empty() {
            errors.push("pipeline.timeframe must be set".to_string());
        }
        if self.pipeline.candle_count == 0 || self.pipeline.candle_count > 1000 {
            errors.push("pipeline.candle_count must be between 1 and 1000".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_files() {
        let config = AppConfig::load_from("/nonexistent").unwrap();
        assert_eq!(config.broker.timeout_secs, 10);
        assert_eq!(config.broker.max_retries, 3);
        assert_eq!(config.broker.backoff_ms, 500);
        assert_eq!(config.database.url, "mem://");
        assert_eq!(config.pipeline.timeframe, "1d");
        assert_eq!(config.pipeline.interval, CandleInterval::OneDay);
        assert_eq!(config.pipeline.candle_count, 100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn validate_flags_missing_credentials() {
        let config = AppConfig::load_from("/nonexistent").unwrap();
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("broker.base_url")));
        assert!(errors.iter().any(|e| e.contains("broker.api_key")));
        assert!(errors.iter().any(|e| e.contains("broker.user_key")));
    }

    #[test]
    fn validate_accepts_complete_config() {
        let mut config = AppConfig::load_from("/nonexistent").unwrap();
        config.broker.base_url = "https://api.example.com/api/v1".to_string();
        config.broker.api_key = "key".to_string();
        config.broker.user_key = "user".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_candle_count() {
        let mut config = AppConfig::load_from("/nonexistent").unwrap();
        config.broker.base_url = "https://api.example.com".to_string();
        config.broker.api_key = "key".to_string();
        config.broker.user_key = "user".to_string();
        config.pipeline.candle_count = 1001;
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("candle_count")));
    }
}
