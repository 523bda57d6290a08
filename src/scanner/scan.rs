use std::sync::Arc;

use tracing::debug;

use crate::app_config::CONFIG;
use crate::cache::HashCache;

use super::registry::CheckerRegistry;
use super::types::{CheckResult, ScanResult, Verdict};

/// The scan entry point: memoized fan-out over the registered checkers
/// with score aggregation into a verdict
pub struct Scanner {
    registry: Arc<CheckerRegistry>,
    result_cache: Option<HashCache>,
    cache_safe_results: bool,
    result_ttl_secs: u64,
}

impl Scanner {
    pub fn new(registry: Arc<CheckerRegistry>) -> Self {
        Self {
            registry,
            result_cache: None,
            cache_safe_results: CONFIG.scan.cache_safe_results,
            result_ttl_secs: CONFIG.scan.result_cache_ttl_secs,
        }
    }

    /// Memoize scan results for repeated lookups of the same URL
    pub fn with_result_cache(mut self, cache: HashCache) -> Self {
        self.result_cache = Some(cache);
        self
    }

    /// Scans `url` through every registered checker, or answers from the
    /// result cache without any external call when a fresh entry exists.
    ///
    /// Summing independent checker scores and clamping at 100 is not a
    /// calibrated probability combination (one certain match and several
    /// weak heuristics saturate identically); the behavior is kept as is
    /// for compatibility with existing consumers.
    pub async fn analyze_url(&self, url: &str) -> ScanResult {
        if let Some(cache) = &self.result_cache {
            if let Some(cached) = cache.get::<ScanResult>(url).await {
                debug!("scan cache hit for {}", url);
                return cached;
            }
        }

        let run = self.registry.run_all(url).await;
        let score = total_score(&run.checks);
        let verdict = Verdict::from_score(score);

        let result = ScanResult {
            url: url.to_string(),
            score,
            verdict,
            reasons: collect_reasons(&run.checks),
            execution_time_ms: run.timing,
        };

        if let Some(cache) = &self.result_cache {
            // Safe verdicts dominate traffic and age poorly; caching them
            // is opt-in
            if verdict != Verdict::Safe || self.cache_safe_results {
                cache.set(url, &result, Some(self.result_ttl_secs)).await;
            }
        }

        result
    }
}

/// Sum of all checker scores, saturated at 100
fn total_score(checks: &[CheckResult]) -> u32 {
    checks.iter().map(|c| c.score).sum::<u32>().min(100)
}

/// Every checker's `reasons` list followed by its singular `reason`, in
/// registration order. Duplicates are preserved.
fn collect_reasons(checks: &[CheckResult]) -> Vec<String> {
    let mut out = Vec::new();
    for check in checks {
        if let Some(reasons) = &check.reasons {
            out.extend(reasons.iter().cloned());
        }
        if let Some(reason) = &check.reason {
            out.push(reason.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::types::Checker;
    use async_trait::async_trait;
    use std::time::Duration;

    fn result(score: u32, reason: Option<&str>, reasons: Option<Vec<&str>>) -> CheckResult {
        CheckResult {
            score,
            reason: reason.map(str::to_string),
            reasons: reasons.map(|r| r.into_iter().map(str::to_string).collect()),
        }
    }

    #[test]
    fn total_score_clamps_at_100() {
        let checks = vec![result(70, None, None), result(40, None, None)];
        assert_eq!(total_score(&checks), 100);
        assert_eq!(total_score(&[result(0, None, None)]), 0);
        assert_eq!(
            total_score(&[result(25, None, None), result(30, None, None)]),
            55
        );
    }

    #[test]
    fn reasons_keep_order_and_duplicates() {
        let checks = vec![
            result(10, Some("single"), Some(vec!["first", "second"])),
            result(0, Some("first"), None),
        ];
        assert_eq!(
            collect_reasons(&checks),
            vec!["first", "second", "single", "first"]
        );
    }

    struct Dummy {
        name: &'static str,
        result: CheckResult,
    }

    #[async_trait]
    impl Checker for Dummy {
        fn name(&self) -> &str {
            self.name
        }

        async fn check(&self, _url: &str) -> CheckResult {
            self.result.clone()
        }
    }

    #[tokio::test]
    async fn two_checkers_aggregate_into_a_phishing_verdict() {
        let mut registry = CheckerRegistry::new(Duration::from_secs(5));
        registry.register(Arc::new(Dummy {
            name: "First",
            result: result(50, None, Some(vec!["A"])),
        }));
        registry.register(Arc::new(Dummy {
            name: "Second",
            result: result(30, None, Some(vec!["B"])),
        }));

        let scanner = Scanner::new(Arc::new(registry));
        let scan = scanner.analyze_url("https://example.com/x").await;

        assert_eq!(scan.score, 80);
        assert_eq!(scan.verdict, Verdict::Phishing);
        assert_eq!(scan.reasons, vec!["A", "B"]);
        assert_eq!(scan.execution_time_ms.len(), 2);
        assert_eq!(scan.url, "https://example.com/x");
    }

    #[tokio::test]
    async fn all_clean_checkers_yield_safe() {
        let mut registry = CheckerRegistry::new(Duration::from_secs(5));
        registry.register(Arc::new(Dummy {
            name: "Clean",
            result: CheckResult::clean(),
        }));

        let scanner = Scanner::new(Arc::new(registry));
        let scan = scanner.analyze_url("https://example.com").await;
        assert_eq!(scan.score, 0);
        assert_eq!(scan.verdict, Verdict::Safe);
        assert!(scan.reasons.is_empty());
    }
}
