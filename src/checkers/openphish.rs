use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::db::RedisPool;
use crate::feeds::{FeedCandidate, FeedFormat, FeedLoader, FeedMatch, FeedSpec};
use crate::scanner::{CheckResult, Checker};

/// Checks URLs against the OpenPhish community feed, a plain-text list
/// updated every few minutes
pub struct OpenPhishChecker {
    loader: Arc<FeedLoader>,
}

fn feed_spec() -> FeedSpec {
    FeedSpec {
        name: "openphish",
        candidates: vec![FeedCandidate {
            url: "https://openphish.com/feed.txt".to_string(),
            format: FeedFormat::Lines,
            heavy: false,
        }],
        refresh_interval: Duration::from_secs(900),
        failure_cooldown: Duration::from_secs(900),
        url_set_key: "openphish:urls".to_string(),
        host_set_key: None,
    }
}

impl OpenPhishChecker {
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
impl Checker for OpenPhishChecker {
    fn name(&self) -> &str {
        "OpenPhish"
    }

    async fn check(&self, url: &str) -> CheckResult {
        match self.loader.lookup(url).await {
            FeedMatch::Url => CheckResult::hit(100, "Exact URL match in OpenPhish feed"),
            _ => CheckResult::clean(),
        }
    }
}
