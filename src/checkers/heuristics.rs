// Heuristic scoring needs no threat feed: URL surface features, DNS
// resolution through the SSRF-safe resolver, and optionally domain age.
// Every path produces a valid result; only SSRF blocks raise the score
// on failure, all other failures are fail-open.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use url::Url;

use crate::cache::HashCache;
use crate::net::{block_if_private, DomainInfo, DomainInfoProvider, SsrfResolver};
use crate::scanner::{CheckResult, Checker};

const SUSPICIOUS_TOKENS: [&str; 6] = ["verify", "update", "secure", "login", "support", "account"];

const LONG_URL_SCORE: u32 = 10;
const AT_SIGN_SCORE: u32 = 20;
const TOKEN_SCORE: u32 = 7;
const HYPHEN_DOMAIN_SCORE: u32 = 6;
const PLAIN_HTTP_SCORE: u32 = 10;
const PRIVATE_TARGET_SCORE: u32 = 60;
const DNS_FAILURE_SCORE: u32 = 25;
const YOUNG_DOMAIN_SCORE: u32 = 10;
const RECENT_DOMAIN_SCORE: u32 = 4;

pub struct HeuristicsChecker {
    resolver: Arc<SsrfResolver>,
    whois: Option<Arc<dyn DomainInfoProvider>>,
    whois_cache: Option<HashCache>,
}

impl HeuristicsChecker {
    pub fn new(resolver: Arc<SsrfResolver>) -> Self {
        Self {
            resolver,
            whois: None,
            whois_cache: None,
        }
    }

    /// Enables the domain-age signal. The cache keeps the backend to one
    /// lookup per domain per TTL.
    pub fn with_domain_info(
        mut self,
        provider: Arc<dyn DomainInfoProvider>,
        cache: HashCache,
    ) -> Self {
        self.whois = Some(provider);
        self.whois_cache = Some(cache);
        self
    }

    async fn domain_info(&self, domain: &str) -> Option<DomainInfo> {
        let provider = self.whois.as_ref()?;
        let cache = self.whois_cache.as_ref()?;

        if let Some(info) = cache.get::<DomainInfo>(domain).await {
            return Some(info);
        }
        match provider.lookup(domain).await {
            Ok(info) => {
                cache.set(domain, &info, None).await;
                Some(info)
            },
            Err(e) => {
                debug!("domain info lookup for {} failed: {}", domain, e);
                None
            },
        }
    }
}

#[async_trait]
impl Checker for HeuristicsChecker {
    fn name(&self) -> &str {
        "Heuristics"
    }

    async fn check(&self, url: &str) -> CheckResult {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            // Nothing to analyze; other checkers may still match raw strings
            Err(_) => return CheckResult::clean(),
        };

        let (mut score, mut reasons) = surface_score(&parsed);

        if let Some(host) = parsed.host_str() {
            if host.parse::<std::net::IpAddr>().is_ok() {
                if block_if_private(host).is_err() {
                    score += PRIVATE_TARGET_SCORE;
                    reasons.push("URL targets a private or internal address".to_string());
                }
            } else {
                match self.resolver.safe_resolve(host).await {
                    Ok(_) => {
                        if let Some(info) = self.domain_info(host).await {
                            match info.age_days(Utc::now()) {
                                Some(age) if age < 90 => {
                                    score += YOUNG_DOMAIN_SCORE;
                                    reasons.push(format!(
                                        "Domain registered only {} days ago",
                                        age
                                    ));
                                },
                                Some(age) if age < 365 => {
                                    score += RECENT_DOMAIN_SCORE;
                                    reasons.push(
                                        "Domain registered less than a year ago".to_string(),
                                    );
                                },
                                _ => {},
                            }
                        }
                    },
                    Err(e) if e.is_blocked() => {
                        score += PRIVATE_TARGET_SCORE;
                        reasons.push("Hostname resolves to a private or internal address".to_string());
                    },
                    Err(e) => {
                        debug!("DNS lookup for {} failed: {}", host, e);
                        score += DNS_FAILURE_SCORE;
                        reasons.push("DNS lookup failed".to_string());
                    },
                }
            }
        }

        CheckResult {
            score: score.min(100),
            reason: None,
            reasons: Some(reasons),
        }
    }
}

/// The last two host labels, standing in for the registrable domain so a
/// hyphenated subdomain of a clean site is not penalized. Without a public
/// suffix list this over-approximates on multi-label TLDs such as co.uk.
fn registrable_part(host: &str) -> &str {
    match host.rmatch_indices('.').nth(1) {
        Some((idx, _)) => &host[idx + 1..],
        None => host,
    }
}

/// Pure URL-shape scoring; no network access
fn surface_score(url: &Url) -> (u32, Vec<String>) {
    let mut score = 0;
    let mut reasons = Vec::new();
    let raw = url.as_str();

    if raw.len() > 200 {
        score += LONG_URL_SCORE;
        reasons.push("Unusually long URL".to_string());
    }

    // An @ lets the real destination hide behind fake credentials
    if raw.contains('@') {
        score += AT_SIGN_SCORE;
        reasons.push("URL contains an @ sign".to_string());
    }

    let lowered = raw.to_lowercase();
    let token_hits = SUSPICIOUS_TOKENS
        .iter()
        .filter(|t| lowered.contains(*t))
        .count() as u32;
    if token_hits > 0 {
        score += token_hits * TOKEN_SCORE;
        reasons.push(format!("Contains {} phishing-associated keywords", token_hits));
    }

    if let Some(host) = url.host_str() {
        if host.parse::<std::net::IpAddr>().is_err() && registrable_part(host).contains('-') {
            score += HYPHEN_DOMAIN_SCORE;
            reasons.push("Hyphenated domain name".to_string());
        }
    }

    if url.scheme() != "https" {
        score += PLAIN_HTTP_SCORE;
        reasons.push("Not served over HTTPS".to_string());
    }

    (score, reasons)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn plain_https_url_scores_zero() {
        let (score, reasons) = surface_score(&parsed("https://example.com/about"));
        assert_eq!(score, 0);
        assert!(reasons.is_empty());
    }

    #[test]
    fn surface_signals_accumulate() {
        // http (+10) plus "secure", "login" and "verify" token hits (+21);
        // the hyphen sits in a subdomain, not the registrable domain
        let (score, reasons) =
            surface_score(&parsed("http://secure-bank.example.com/login/verify"));
        assert_eq!(score, 10 + 3 * 7);
        assert_eq!(reasons.len(), 2);
    }

    #[test]
    fn hyphen_penalty_applies_to_the_registrable_domain_only() {
        assert_eq!(registrable_part("secure-bank.example.com"), "example.com");
        assert_eq!(registrable_part("pay-pal.com"), "pay-pal.com");
        assert_eq!(registrable_part("localhost"), "localhost");

        let (score, reasons) = surface_score(&parsed("https://pay-pal.com/x"));
        assert_eq!(score, HYPHEN_DOMAIN_SCORE);
        assert_eq!(reasons, vec!["Hyphenated domain name".to_string()]);

        let (score, _) = surface_score(&parsed("https://cdn-edge.example.com/x"));
        assert_eq!(score, 0);
    }

    #[test]
    fn at_sign_is_penalized() {
        let (score, _) = surface_score(&parsed("https://trusted.com@evil.example/x"));
        assert!(score >= AT_SIGN_SCORE);
    }

    #[test]
    fn long_urls_are_penalized() {
        let long = format!("https://example.com/{}", "a".repeat(250));
        let (score, reasons) = surface_score(&parsed(&long));
        assert_eq!(score, LONG_URL_SCORE);
        assert_eq!(reasons, vec!["Unusually long URL".to_string()]);
    }

    #[test]
    fn ip_literal_hosts_are_not_hyphen_checked() {
        let (score, _) = surface_score(&parsed("https://8.8.8.8/x"));
        assert_eq!(score, 0);
    }

    #[tokio::test]
    async fn private_ip_literal_is_elevated_without_any_network_call() {
        let resolver = Arc::new(SsrfResolver::from_system_conf().unwrap());
        let checker = HeuristicsChecker::new(resolver);

        let result = checker.check("http://127.0.0.1/login").await;
        // http +10, "login" token +7, private target +60
        assert_eq!(result.score, 77);
        let reasons = result.reasons.unwrap();
        assert!(reasons
            .iter()
            .any(|r| r.contains("private or internal address")));
    }

    #[tokio::test]
    async fn unparseable_url_is_clean_not_an_error() {
        let resolver = Arc::new(SsrfResolver::from_system_conf().unwrap());
        let checker = HeuristicsChecker::new(resolver);
        assert_eq!(checker.check("not a url").await, CheckResult::clean());
    }
}
