use phisherman_core::{RedisConfig, RedisPool};

/// Pool against the locally configured Redis, or `None` so the caller can
/// skip when no instance is reachable
pub async fn test_pool() -> Option<RedisPool> {
    let pool = RedisPool::new(RedisConfig::from_env()).await.ok()?;
    if !pool.health_check().await.is_healthy {
        return None;
    }
    Some(pool)
}
