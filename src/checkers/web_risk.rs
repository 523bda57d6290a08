// Google Web Risk uris:search lookup. Same caching discipline as the Safe
// Browsing checker: keyed paid API, verdicts memoized, errors cached on a
// short TTL and never propagated.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cache::HashCache;
use crate::scanner::{CheckResult, Checker};

const ENDPOINT: &str = "https://webrisk.googleapis.com/v1/uris:search";
const MATCH_SCORE: u32 = 90;
const ERROR_CACHE_TTL_SECS: u64 = 900;

pub struct WebRiskChecker {
    api_key: Option<String>,
    http: reqwest::Client,
    cache: Option<HashCache>,
}

impl WebRiskChecker {
    pub fn new(api_key: Option<String>, http: reqwest::Client) -> Self {
        Self {
            api_key,
            http,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: HashCache) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn query(&self, api_key: &str, url: &str) -> Result<CheckResult, reqwest::Error> {
        // threatTypes is a repeated query parameter
        let doc: serde_json::Value = self
            .http
            .get(ENDPOINT)
            .query(&[
                ("uri", url),
                ("key", api_key),
                ("threatTypes", "MALWARE"),
                ("threatTypes", "SOCIAL_ENGINEERING"),
                ("threatTypes", "UNWANTED_SOFTWARE"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // An empty JSON object means no threat was found
        let flagged = doc.get("threat").is_some();

        Ok(if flagged {
            CheckResult::hit(MATCH_SCORE, "Google Web Risk threat detected")
        } else {
            CheckResult::clean()
        })
    }
}

#[async_trait]
impl Checker for WebRiskChecker {
    fn name(&self) -> &str {
        "WebRisk"
    }

    async fn check(&self, url: &str) -> CheckResult {
        let Some(api_key) = &self.api_key else {
            debug!("web risk key not configured, skipping");
            return CheckResult::clean();
        };

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get::<CheckResult>(url).await {
                return cached;
            }
        }

        match self.query(api_key, url).await {
            Ok(result) => {
                if let Some(cache) = &self.cache {
                    cache.set(url, &result, None).await;
                }
                result
            },
            Err(e) => {
                warn!("web risk lookup failed: {}", e);
                let result = CheckResult::clean();
                if let Some(cache) = &self.cache {
                    cache.set(url, &result, Some(ERROR_CACHE_TTL_SECS)).await;
                }
                result
            },
        }
    }
}
