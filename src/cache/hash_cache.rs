// Per-key TTL cache built on one Redis hash plus a sorted-set expiry index.
//
// Hash fields have no native expiry, so every entry carries its own absolute
// deadline and a companion ZSET member scored by that deadline. Reads treat
// expired entries as absent and delete them; the Cache Manager sweeps the
// rest via `cleanup` so abandoned entries do not accumulate forever.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::db::RedisPool;

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    /// Absolute expiry, epoch milliseconds
    exp: i64,
    value: serde_json::Value,
}

#[derive(Clone)]
pub struct HashCache {
    pool: RedisPool,
    hash_key: String,
    expiry_key: String,
    default_ttl_secs: u64,
}

/// Fixed-length field id so arbitrarily long logical keys (full URLs) never
/// blow up hash field names
pub fn field_id(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..32].to_string()
}

impl HashCache {
    pub fn new(pool: RedisPool, name: &str, default_ttl_secs: u64) -> Self {
        Self {
            pool,
            hash_key: format!("{}_hash", name),
            expiry_key: format!("{}_expiry", name),
            default_ttl_secs,
        }
    }

    pub fn name(&self) -> &str {
        // hash_key is "<name>_hash"
        &self.hash_key[..self.hash_key.len() - "_hash".len()]
    }

    /// Returns the cached value, or `None` on miss, expiry, store failure or
    /// undecodable payload. An expired entry is deleted on the way out.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let field = field_id(key);

        let raw = match self.pool.hget(&self.hash_key, &field).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("HashCache {} read error: {}", self.hash_key, e);
                return None;
            },
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("HashCache {} entry undecodable, dropping: {}", self.hash_key, e);
                self.remove_field(&field).await;
                return None;
            },
        };

        if entry.exp <= Utc::now().timestamp_millis() {
            self.remove_field(&field).await;
            return None;
        }

        serde_json::from_value(entry.value).ok()
    }

    /// Stores `value` under `key` for `ttl_secs` (default TTL when `None`).
    /// Store failures are logged and swallowed: the entry just is not cached.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: Option<u64>) {
        let field = field_id(key);
        let ttl = ttl_secs.unwrap_or(self.default_ttl_secs);
        let exp = Utc::now().timestamp_millis() + (ttl as i64) * 1000;

        let entry = match serde_json::to_value(value) {
            Ok(v) => CacheEntry { exp, value: v },
            Err(e) => {
                warn!("HashCache {} serialize error: {}", self.hash_key, e);
                return;
            },
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("HashCache {} serialize error: {}", self.hash_key, e);
                return;
            },
        };

        // Field and expiry-index member are written together
        if let Err(e) = self.pool.hset(&self.hash_key, &field, &raw).await {
            warn!("HashCache {} write error: {}", self.hash_key, e);
            return;
        }
        if let Err(e) = self.pool.zadd(&self.expiry_key, exp, &field).await {
            warn!("HashCache {} expiry index write error: {}", self.hash_key, e);
        }
    }

    pub async fn delete(&self, key: &str) {
        self.remove_field(&field_id(key)).await;
    }

    /// Bulk expiry sweep: removes every entry whose deadline has passed and
    /// returns how many were dropped. Called periodically by the Cache
    /// Manager.
    pub async fn cleanup(&self) -> u64 {
        let now = Utc::now().timestamp_millis();

        let expired = match self.pool.zrangebyscore_upto(&self.expiry_key, now).await {
            Ok(members) => members,
            Err(e) => {
                warn!("HashCache {} cleanup range error: {}", self.hash_key, e);
                return 0;
            },
        };
        if expired.is_empty() {
            return 0;
        }

        if let Err(e) = self.pool.hdel(&self.hash_key, &expired).await {
            warn!("HashCache {} cleanup hdel error: {}", self.hash_key, e);
            return 0;
        }
        if let Err(e) = self.pool.zrem(&self.expiry_key, &expired).await {
            warn!("HashCache {} cleanup zrem error: {}", self.hash_key, e);
        }

        debug!(
            "HashCache {} swept {} expired entries",
            self.hash_key,
            expired.len()
        );
        expired.len() as u64
    }

    async fn remove_field(&self, field: &str) {
        let fields = [field.to_string()];
        if let Err(e) = self.pool.hdel(&self.hash_key, &fields).await {
            warn!("HashCache {} delete error: {}", self.hash_key, e);
        }
        if let Err(e) = self.pool.zrem(&self.expiry_key, &fields).await {
            warn!("HashCache {} expiry delete error: {}", self.hash_key, e);
        }
    }
}
