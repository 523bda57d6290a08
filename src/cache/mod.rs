// TTL-simulated caching and the periodic refresh/sweep scheduler

pub mod hash_cache;
pub mod manager;

pub use hash_cache::HashCache;
pub use manager::CacheManager;
