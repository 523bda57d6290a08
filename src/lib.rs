// Phisherman core: concurrent URL risk scanning backed by cached threat
// feeds, a heuristic analyzer, and Redis-based memoization. The HTTP
// front door lives in a separate crate and only calls `Scanner::analyze_url`.

pub mod app_config;
pub mod cache;
pub mod checkers;
pub mod db;
pub mod feeds;
pub mod net;
pub mod scanner;

pub use app_config::{AppConfig, CONFIG};
pub use cache::{CacheManager, HashCache};
pub use db::{RedisConfig, RedisPool};
pub use net::{DomainInfoProvider, SsrfResolver};
pub use scanner::{CheckResult, Checker, CheckerRegistry, ScanResult, Scanner, Verdict};

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use checkers::{
    HeuristicsChecker, OpenPhishChecker, PhishStatsChecker, PhishTankChecker, SafeBrowsingChecker,
    UrlhausChecker, WebRiskChecker,
};

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&CONFIG.rust_log)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// The fully wired scanning core handed to the front door at startup
pub struct Core {
    pub scanner: Arc<Scanner>,
    pub cache_manager: CacheManager,
    pub pool: RedisPool,
}

impl Core {
    /// Kick off the periodic feed refresh and cache sweep loop
    pub async fn start_background_refresh(&self) {
        self.cache_manager
            .start(Duration::from_secs(CONFIG.feeds.refresh_cycle_secs))
            .await;
    }

    pub async fn shutdown(&self) {
        self.cache_manager.stop().await;
    }
}

/// Builds the default checker set, wires every feed loader into the cache
/// manager, and returns the assembled core. Passing a `DomainInfoProvider`
/// enables the domain-age heuristic, with lookups cached for a day.
pub async fn init_core(domain_info: Option<Arc<dyn DomainInfoProvider>>) -> anyhow::Result<Core> {
    CONFIG.validate().context("invalid configuration")?;

    let pool = RedisPool::new(CONFIG.redis.clone())
        .await
        .context("failed to initialize redis pool")?;

    let http = reqwest::Client::builder()
        .user_agent(&CONFIG.feeds.user_agent)
        .timeout(Duration::from_secs(120))
        .build()
        .context("failed to build http client")?;

    let resolver = Arc::new(
        SsrfResolver::from_system_conf()
            .map_err(|e| anyhow::anyhow!("failed to build dns resolver: {}", e))?,
    );

    let phishtank = PhishTankChecker::new(pool.clone(), http.clone());
    let openphish = OpenPhishChecker::new(pool.clone(), http.clone());
    let urlhaus = UrlhausChecker::new(pool.clone(), http.clone());
    let phishstats = PhishStatsChecker::new(pool.clone(), http.clone());

    let cache_manager = CacheManager::new();
    let loaders = [
        phishtank.loader(),
        openphish.loader(),
        urlhaus.loader(),
        phishstats.loader(),
    ];
    for loader in loaders {
        let name = loader.name();
        cache_manager
            .add_task(name, move || {
                let loader = Arc::clone(&loader);
                async move { loader.refresh().await }
            })
            .await;
    }

    let scan_cache = HashCache::new(
        pool.clone(),
        "scan_results",
        CONFIG.scan.result_cache_ttl_secs,
    );
    cache_manager.register_cache(scan_cache.clone()).await;

    // Per-URL verdict caches for the keyed external APIs
    let gsb_cache = HashCache::new(pool.clone(), "gsb", 3600);
    cache_manager.register_cache(gsb_cache.clone()).await;
    let safe_browsing = SafeBrowsingChecker::new(
        CONFIG.intel.safe_browsing_api_key.clone(),
        http.clone(),
    )
    .with_cache(gsb_cache);

    let gwr_cache = HashCache::new(pool.clone(), "gwr", 3600);
    cache_manager.register_cache(gwr_cache.clone()).await;
    let web_risk =
        WebRiskChecker::new(CONFIG.intel.web_risk_api_key.clone(), http).with_cache(gwr_cache);

    let mut heuristics = HeuristicsChecker::new(resolver);
    if let Some(provider) = domain_info {
        let whois_cache = HashCache::new(pool.clone(), "domain_info", 24 * 3600);
        cache_manager.register_cache(whois_cache.clone()).await;
        heuristics = heuristics.with_domain_info(provider, whois_cache);
    }

    let mut registry = CheckerRegistry::new(Duration::from_millis(CONFIG.scan.checker_timeout_ms));
    registry.register(Arc::new(phishtank));
    registry.register(Arc::new(openphish));
    registry.register(Arc::new(urlhaus));
    registry.register(Arc::new(phishstats));
    registry.register(Arc::new(safe_browsing));
    registry.register(Arc::new(web_risk));
    registry.register(Arc::new(heuristics));

    let scanner = Arc::new(Scanner::new(Arc::new(registry)).with_result_cache(scan_cache));

    Ok(Core {
        scanner,
        cache_manager,
        pool,
    })
}
