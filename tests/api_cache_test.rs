mod common;

use phisherman_core::checkers::{SafeBrowsingChecker, WebRiskChecker};
use phisherman_core::{CheckResult, Checker, HashCache};
use serial_test::serial;

async fn fresh_cache(name: &str) -> Option<HashCache> {
    let pool = common::test_pool().await?;
    let hash = format!("{}_hash", name);
    let expiry = format!("{}_expiry", name);
    pool.del(&[hash.as_str(), expiry.as_str()]).await.ok()?;
    Some(HashCache::new(pool, name, 3600))
}

#[tokio::test]
#[serial]
async fn safe_browsing_answers_from_the_verdict_cache() {
    let Some(cache) = fresh_cache("it_gsb").await else {
        eprintln!("redis unavailable, skipping");
        return;
    };

    let url = "https://flagged.example/login";
    let verdict = CheckResult::hit(50, "Google Safe Browsing flagged this URL as dangerous");
    cache.set(url, &verdict, None).await;

    // The key is set but the endpoint is unreachable: a cache hit must
    // answer before any request is attempted
    let checker = SafeBrowsingChecker::new(
        Some("test-key".to_string()),
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(1))
            .build()
            .unwrap(),
    )
    .with_cache(cache);

    assert_eq!(checker.check(url).await, verdict);
}

#[tokio::test]
#[serial]
async fn web_risk_caches_failed_lookups_as_clean() {
    let Some(cache) = fresh_cache("it_gwr").await else {
        eprintln!("redis unavailable, skipping");
        return;
    };

    let url = "https://unknown.example/x";
    // A 1ms client timeout makes the lookup fail without real network I/O
    let checker = WebRiskChecker::new(
        Some("test-key".to_string()),
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(1))
            .build()
            .unwrap(),
    )
    .with_cache(cache.clone());

    assert_eq!(checker.check(url).await, CheckResult::clean());

    // The failure was cached, so the broken service is not re-queried
    // on the next scan
    let cached: Option<CheckResult> = cache.get(url).await;
    assert_eq!(cached, Some(CheckResult::clean()));
}
