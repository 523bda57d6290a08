mod common;

use phisherman_core::HashCache;
use serde::{Deserialize, Serialize};
use serial_test::serial;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Payload {
    score: u32,
    label: String,
}

async fn fresh_cache(name: &str) -> Option<HashCache> {
    let pool = common::test_pool().await?;
    let hash = format!("{}_hash", name);
    let expiry = format!("{}_expiry", name);
    pool.del(&[hash.as_str(), expiry.as_str()]).await.ok()?;
    Some(HashCache::new(pool, name, 60))
}

#[tokio::test]
#[serial]
async fn round_trip_and_delete() {
    let Some(cache) = fresh_cache("it_roundtrip").await else {
        eprintln!("redis unavailable, skipping");
        return;
    };

    let value = Payload {
        score: 42,
        label: "hello".to_string(),
    };
    cache.set("https://example.com/a", &value, None).await;

    let back: Option<Payload> = cache.get("https://example.com/a").await;
    assert_eq!(back, Some(value));

    assert_eq!(cache.get::<Payload>("https://example.com/other").await, None);

    cache.delete("https://example.com/a").await;
    assert_eq!(cache.get::<Payload>("https://example.com/a").await, None);
}

#[tokio::test]
#[serial]
async fn expired_entries_read_as_absent() {
    let Some(cache) = fresh_cache("it_expiry").await else {
        eprintln!("redis unavailable, skipping");
        return;
    };

    let value = Payload {
        score: 1,
        label: "stale".to_string(),
    };
    // Zero TTL expires immediately
    cache.set("key", &value, Some(0)).await;
    assert_eq!(cache.get::<Payload>("key").await, None);

    // The expired read self-heals: a second read still finds nothing
    assert_eq!(cache.get::<Payload>("key").await, None);
}

#[tokio::test]
#[serial]
async fn cleanup_sweeps_only_expired_entries() {
    let Some(cache) = fresh_cache("it_cleanup").await else {
        eprintln!("redis unavailable, skipping");
        return;
    };

    let value = Payload {
        score: 7,
        label: "x".to_string(),
    };
    cache.set("dead-1", &value, Some(0)).await;
    cache.set("dead-2", &value, Some(0)).await;
    cache.set("alive", &value, Some(120)).await;

    let removed = cache.cleanup().await;
    assert_eq!(removed, 2);

    assert_eq!(cache.get::<Payload>("alive").await, Some(value));
    // A second sweep has nothing left to do
    assert_eq!(cache.cleanup().await, 0);
}
