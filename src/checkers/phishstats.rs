use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::db::RedisPool;
use crate::feeds::{FeedCandidate, FeedFormat, FeedLoader, FeedMatch, FeedSpec};
use crate::scanner::{CheckResult, Checker};

/// Checks URLs against the PhishStats API, which serves the most recent
/// reports as a small JSON page
pub struct PhishStatsChecker {
    loader: Arc<FeedLoader>,
}

fn feed_spec() -> FeedSpec {
    FeedSpec {
        name: "phishstats",
        candidates: vec![FeedCandidate {
            url: "https://api.phishstats.info/api/phishing?_sort=-id&_size=1000".to_string(),
            format: FeedFormat::JsonArray { url_field: "url" },
            // Bounded to 1000 records, safe to buffer anywhere
            heavy: false,
        }],
        refresh_interval: Duration::from_secs(5400),
        failure_cooldown: Duration::from_secs(900),
        url_set_key: "phishstats:urls".to_string(),
        host_set_key: Some("phishstats:hosts".to_string()),
    }
}

impl PhishStatsChecker {
    pub fn new(pool: RedisPool, http: reqwest::Client) -> Self {
        Self {
            loader: Arc::new(FeedLoader::new(feed_spec(), pool, http)),
        }
    }

    pub fn loader(&self) -> Arc<FeedLoader> {
        Arc::clone(&self.loader)
    }
}

#[async_trait]
impl Checker for PhishStatsChecker {
    fn name(&self) -> &str {
        "PhishStats"
    }

    async fn check(&self, url: &str) -> CheckResult {
        match self.loader.lookup(url).await {
            FeedMatch::Url => CheckResult::hit(100, "Exact URL match in PhishStats reports"),
            FeedMatch::Host => CheckResult::hit(80, "Host reported to PhishStats"),
            FeedMatch::Miss => CheckResult::clean(),
        }
    }
}
