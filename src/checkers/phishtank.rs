use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::app_config::CONFIG;
use crate::db::RedisPool;
use crate::feeds::{FeedCandidate, FeedFormat, FeedLoader, FeedMatch, FeedSpec};
use crate::scanner::{CheckResult, Checker};

/// Checks URLs against the PhishTank verified-phish dump.
///
/// The CSV.GZ dump is preferred; the full JSON dump is a last resort and
/// too large for memory-constrained instances.
pub struct PhishTankChecker {
    loader: Arc<FeedLoader>,
}

fn feed_spec() -> FeedSpec {
    let mut candidates = Vec::new();
    if let Some(url) = &CONFIG.feeds.phishtank_feed_url {
        candidates.push(FeedCandidate {
            url: url.clone(),
            format: FeedFormat::Csv { url_column: 1 },
            heavy: false,
        });
    }
    candidates.push(FeedCandidate {
        url: "https://data.phishtank.com/data/online-valid.csv.gz".to_string(),
        format: FeedFormat::Csv { url_column: 1 },
        heavy: false,
    });
    candidates.push(FeedCandidate {
        url: "https://data.phishtank.com/data/online-valid.json".to_string(),
        format: FeedFormat::JsonArray { url_field: "url" },
        heavy: true,
    });

    FeedSpec {
        name: "phishtank",
        candidates,
        refresh_interval: Duration::from_secs(3600),
        failure_cooldown: Duration::from_secs(900),
        url_set_key: "phishtank:urls".to_string(),
        host_set_key: None,
    }
}

impl PhishTankChecker {
    pub fn new(pool: RedisPool, http: reqwest::Client) -> Self {
        Self {
            loader: Arc::new(FeedLoader::new(feed_spec(), pool, http)),
        }
    }

    /// Refresh handle for the Cache Manager
    pub fn loader(&self) -> Arc<FeedLoader> {
        Arc::clone(&self.loader)
    }
}

#[async_trait]
impl Checker for PhishTankChecker {
    fn name(&self) -> &str {
        "PhishTank"
    }

    async fn check(&self, url: &str) -> CheckResult {
        match self.loader.lookup(url).await {
            FeedMatch::Url => CheckResult::hit(100, "Exact URL match in PhishTank database"),
            _ => CheckResult::clean(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_candidates_are_always_present() {
        let spec = feed_spec();
        assert!(spec.candidates.len() >= 2);
        let last = spec.candidates.last().unwrap();
        assert!(matches!(last.format, FeedFormat::JsonArray { .. }));
        assert!(last.heavy);
    }
}
