// Google Safe Browsing v4 lookup. The API is keyed and billed, so every
// verdict is memoized through a HashCache; errors are cached too, on a
// shorter TTL, so a broken or unbilled key is not retried on every scan.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cache::HashCache;
use crate::scanner::{CheckResult, Checker};

const ENDPOINT: &str = "https://safebrowsing.googleapis.com/v4/threatMatches:find";
const THREAT_TYPES: [&str; 4] = [
    "MALWARE",
    "SOCIAL_ENGINEERING",
    "UNWANTED_SOFTWARE",
    "POTENTIALLY_HARMFUL_APPLICATION",
];
const MATCH_SCORE: u32 = 50;
const ERROR_CACHE_TTL_SECS: u64 = 900;

pub struct SafeBrowsingChecker {
    api_key: Option<String>,
    http: reqwest::Client,
    cache: Option<HashCache>,
}

impl SafeBrowsingChecker {
    pub fn new(api_key: Option<String>, http: reqwest::Client) -> Self {
        Self {
            api_key,
            http,
            cache: None,
        }
    }

    /// Memoize verdicts so the paid API sees each URL at most once per TTL
    pub fn with_cache(mut self, cache: HashCache) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn query(&self, api_key: &str, url: &str) -> Result<CheckResult, reqwest::Error> {
        let body = serde_json::json!({
            "client": { "clientId": "phisherman", "clientVersion": "1.0" },
            "threatInfo": {
                "threatTypes": THREAT_TYPES,
                "platformTypes": ["ANY_PLATFORM"],
                "threatEntryTypes": ["URL"],
                "threatEntries": [{ "url": url }],
            },
        });

        let doc: serde_json::Value = self
            .http
            .post(format!("{}?key={}", ENDPOINT, api_key))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let flagged = doc
            .get("matches")
            .and_then(|m| m.as_array())
            .map(|m| !m.is_empty())
            .unwrap_or(false);

        Ok(if flagged {
            CheckResult::hit(
                MATCH_SCORE,
                "Google Safe Browsing flagged this URL as dangerous",
            )
        } else {
            CheckResult::clean()
        })
    }
}

#[async_trait]
impl Checker for SafeBrowsingChecker {
    fn name(&self) -> &str {
        "SafeBrowsing"
    }

    async fn check(&self, url: &str) -> CheckResult {
        let Some(api_key) = &self.api_key else {
            debug!("safe browsing key not configured, skipping");
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
                warn!("safe browsing lookup failed: {}", e);
                let result = CheckResult::clean();
                if let Some(cache) = &self.cache {
                    cache.set(url, &result, Some(ERROR_CACHE_TTL_SECS)).await;
                }
                result
            },
        }
    }
}
