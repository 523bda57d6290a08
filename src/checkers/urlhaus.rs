use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::db::RedisPool;
use crate::feeds::{FeedCandidate, FeedFormat, FeedLoader, FeedMatch, FeedSpec};
use crate::scanner::{CheckResult, Checker};

/// Checks URLs against the abuse.ch URLhaus active-malware-URL CSV.
/// Maintains both an exact-URL set and a hostname set.
pub struct UrlhausChecker {
    loader: Arc<FeedLoader>,
}

fn feed_spec() -> FeedSpec {
    FeedSpec {
        name: "urlhaus",
        candidates: vec![FeedCandidate {
            // id,dateadded,url,url_status,... with # comment headers
            url: "https://urlhaus.abuse.ch/downloads/csv_online/".to_string(),
            format: FeedFormat::Csv { url_column: 2 },
            heavy: false,
        }],
        refresh_interval: Duration::from_secs(3600),
        failure_cooldown: Duration::from_secs(900),
        url_set_key: "urlhaus:urls".to_string(),
        host_set_key: Some("urlhaus:hosts".to_string()),
    }
}

impl UrlhausChecker {
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
impl Checker for UrlhausChecker {
    fn name(&self) -> &str {
        "URLhaus"
    }

    async fn check(&self, url: &str) -> CheckResult {
        match self.loader.lookup(url).await {
            FeedMatch::Url => CheckResult::hit(100, "Exact URL match in URLhaus database"),
            FeedMatch::Host => CheckResult::hit(80, "Host listed in URLhaus database"),
            FeedMatch::Miss => CheckResult::clean(),
        }
    }
}
