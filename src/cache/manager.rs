// Periodic scheduler that drives feed refreshes and expiry sweeps.
//
// Tasks run sequentially, not concurrently: several multi-megabyte feeds
// refreshing at once would spike memory and bandwidth on small instances.
// One task's failure is logged and never blocks the others.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::hash_cache::HashCache;

type RefreshFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type RefreshFn = Arc<dyn Fn() -> RefreshFuture + Send + Sync>;

struct RefreshTask {
    name: String,
    run: RefreshFn,
}

struct Inner {
    tasks: RwLock<Vec<RefreshTask>>,
    caches: RwLock<Vec<HashCache>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<Inner>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tasks: RwLock::new(Vec::new()),
                caches: RwLock::new(Vec::new()),
                handle: Mutex::new(None),
            }),
        }
    }

    /// Register a named refresh routine (typically a feed loader's refresh
    /// entry point)
    pub async fn add_task<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = RefreshTask {
            name: name.to_string(),
            run: Arc::new(move || Box::pin(f()) as RefreshFuture),
        };
        self.inner.tasks.write().await.push(task);
    }

    /// Register a TTL-simulated cache for the periodic expiry sweep
    pub async fn register_cache(&self, cache: HashCache) {
        self.inner.caches.write().await.push(cache);
    }

    /// Run all tasks once immediately, then on a fixed interval.
    /// Calling `start` while already running is a no-op.
    pub async fn start(&self, interval: Duration) {
        let mut handle = self.inner.handle.lock().await;
        if handle.is_some() {
            return;
        }

        self.run_all().await;

        let manager = self.clone();
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Consume the immediate first tick; the initial run just happened
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.run_all().await;
            }
        }));
    }

    /// One full cycle: every refresh task in registration order, then an
    /// expiry sweep over every registered cache
    pub async fn run_all(&self) {
        info!("CacheManager: starting background refreshes");

        let tasks: Vec<(String, RefreshFn)> = {
            let tasks = self.inner.tasks.read().await;
            tasks
                .iter()
                .map(|t| (t.name.clone(), Arc::clone(&t.run)))
                .collect()
        };

        for (name, run) in tasks {
            info!("CacheManager: refreshing {}", name);
            // The task future is expected to handle its own errors; a panic
            // inside it would otherwise take down the scheduler loop
            let result = tokio::spawn(run()).await;
            if let Err(e) = result {
                error!("CacheManager: task {} panicked: {}", name, e);
            }
        }

        let caches: Vec<HashCache> = self.inner.caches.read().await.clone();
        for cache in caches {
            let removed = cache.cleanup().await;
            if removed > 0 {
                info!(
                    "CacheManager: swept {} expired entries from {}",
                    removed,
                    cache.name()
                );
            }
        }

        info!("CacheManager: background refreshes complete");
    }

    /// Cancel the interval loop. Safe to call when not running.
    pub async fn stop(&self) {
        let mut handle = self.inner.handle.lock().await;
        if let Some(handle) = handle.take() {
            handle.abort();
            info!("CacheManager: stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.handle.lock().await.is_some()
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn run_all_executes_tasks_in_order_and_isolates_failures() {
        let manager = CacheManager::new();
        let counter = Arc::new(AtomicU32::new(0));

        let c1 = counter.clone();
        manager
            .add_task("first", move || {
                let c = c1.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        manager
            .add_task("exploding", || async {
                panic!("refresh blew up");
            })
            .await;

        let c2 = counter.clone();
        manager
            .add_task("second", move || {
                let c = c2.clone();
                async move {
                    c.fetch_add(10, Ordering::SeqCst);
                }
            })
            .await;

        manager.run_all().await;

        // Both healthy tasks ran despite the panicking one in between
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn second_start_is_a_noop_and_stop_cancels() {
        let manager = CacheManager::new();
        let runs = Arc::new(AtomicU32::new(0));

        let r = runs.clone();
        manager
            .add_task("count", move || {
                let r = r.clone();
                async move {
                    r.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        manager.start(Duration::from_secs(3600)).await;
        assert!(manager.is_running().await);
        let after_first = runs.load(Ordering::SeqCst);
        assert_eq!(after_first, 1); // ran once immediately

        manager.start(Duration::from_secs(3600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_first); // no second immediate run

        manager.stop().await;
        assert!(!manager.is_running().await);
        // Stopping twice is fine
        manager.stop().await;
    }
}
