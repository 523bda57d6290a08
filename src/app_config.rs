// Centralized configuration management for the Phisherman core
// Load ALL env vars ONCE at startup

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

use crate::db::RedisConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Global application configuration loaded once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    dotenv::dotenv().ok();
    AppConfig::from_env()
});

/// Complete core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub rust_log: String,

    // Nested sections
    pub redis: RedisConfig,
    pub scan: ScanConfig,
    pub feeds: FeedSettings,
    pub intel: IntelApiSettings,
}

/// Keys for the paid threat-intelligence APIs. Either may be absent; the
/// matching checker then answers clean instead of erroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelApiSettings {
    pub safe_browsing_api_key: Option<String>,
    pub web_risk_api_key: Option<String>,
}

/// Scan orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Per-checker deadline in milliseconds
    pub checker_timeout_ms: u64,
    /// TTL for memoized scan results (seconds)
    pub result_cache_ttl_secs: u64,
    /// Whether `safe` verdicts are cached at all. They are the overwhelming
    /// majority of traffic and the lowest value to keep, so default off.
    pub cache_safe_results: bool,
}

/// Threat-feed ingestion settings shared by all feed loaders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    /// Optional override for the primary PhishTank dump endpoint
    pub phishtank_feed_url: Option<String>,
    /// Hard cap on bytes fetched per feed candidate
    pub max_download_bytes: usize,
    /// Entries per SADD batch during ingest
    pub batch_size: usize,
    /// Skip whole-document JSON candidates to avoid large in-memory buffers
    pub low_memory_mode: bool,
    /// User-Agent sent to feed endpoints
    pub user_agent: String,
    /// Interval between CacheManager refresh cycles (seconds)
    pub refresh_cycle_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "phisherman_core=debug".to_string()),
            redis: RedisConfig::from_env(),
            scan: ScanConfig {
                checker_timeout_ms: env_parse("CHECKER_TIMEOUT_MS", 2500),
                result_cache_ttl_secs: env_parse("SCAN_CACHE_TTL_SECS", 300),
                cache_safe_results: env_flag("SCAN_CACHE_SAFE_RESULTS", false),
            },
            feeds: FeedSettings {
                phishtank_feed_url: env::var("PHISHTANK_FEED_URL").ok(),
                max_download_bytes: env_parse("FEED_MAX_DOWNLOAD_BYTES", 64 * 1024 * 1024),
                batch_size: env_parse("FEED_SADD_BATCH_SIZE", 500),
                low_memory_mode: env_flag("FEED_LOW_MEMORY_MODE", true),
                user_agent: env::var("FEED_USER_AGENT")
                    .unwrap_or_else(|_| "Phisherman/1.0".to_string()),
                refresh_cycle_secs: env_parse("FEED_REFRESH_CYCLE_SECS", 3600),
            },
            intel: IntelApiSettings {
                safe_browsing_api_key: env::var("GOOGLE_SAFE_API_KEY").ok(),
                web_risk_api_key: env::var("WEBRISK_API_KEY").ok(),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.checker_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "CHECKER_TIMEOUT_MS".into(),
                "must be greater than 0".into(),
            ));
        }
        if self.feeds.batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "FEED_SADD_BATCH_SIZE".into(),
                "must be greater than 0".into(),
            ));
        }
        if self.feeds.max_download_bytes < 1024 {
            return Err(ConfigError::InvalidValue(
                "FEED_MAX_DOWNLOAD_BYTES".into(),
                "too small to hold any feed".into(),
            ));
        }
        self.redis
            .validate()
            .map_err(|e| ConfigError::InvalidValue("REDIS_*".into(), e))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::from_env();
        assert!(config.validate().is_ok());
        assert!(config.scan.checker_timeout_ms > 0);
        assert!(config.feeds.batch_size > 0);
    }

    #[test]
    fn env_flag_parses_common_truthy_values() {
        std::env::set_var("PHISHERMAN_TEST_FLAG", "true");
        assert!(env_flag("PHISHERMAN_TEST_FLAG", false));
        std::env::set_var("PHISHERMAN_TEST_FLAG", "0");
        assert!(!env_flag("PHISHERMAN_TEST_FLAG", true));
        std::env::remove_var("PHISHERMAN_TEST_FLAG");
    }
}
