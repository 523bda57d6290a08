use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tracing::warn;

use super::types::{CheckResult, Checker};

/// Outcome of one fan-out: one result per registered checker, in
/// registration order, plus wall time per checker
pub struct RegistryRun {
    pub checks: Vec<CheckResult>,
    pub timing: HashMap<String, u64>,
}

/// Ordered collection of checkers, run concurrently per scan.
///
/// Each checker runs under a deadline. The deadline is non-cancelling: a
/// checker that overruns keeps executing on its own task and its eventual
/// result is discarded, while the scan proceeds with a substitute result.
/// A panicking checker is likewise absorbed into a zero-score result, so
/// one bad checker can never fail or stall a scan.
pub struct CheckerRegistry {
    checkers: Vec<Arc<dyn Checker>>,
    deadline: Duration,
}

impl CheckerRegistry {
    pub fn new(deadline: Duration) -> Self {
        Self {
            checkers: Vec::new(),
            deadline,
        }
    }

    /// Appends a checker. Duplicate registration is a caller error and is
    /// not validated.
    pub fn register(&mut self, checker: Arc<dyn Checker>) {
        self.checkers.push(checker);
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// Runs every checker against `url` concurrently and waits for all of
    /// them (or their deadlines)
    pub async fn run_all(&self, url: &str) -> RegistryRun {
        let deadline = self.deadline;
        let futures = self.checkers.iter().map(|checker| {
            let checker = Arc::clone(checker);
            let url = url.to_string();
            async move {
                let name = checker.name().to_string();
                let started = Instant::now();

                // The checker runs on its own task so a timeout only
                // abandons it and a panic is contained in the JoinError
                let task = tokio::spawn(async move { checker.check(&url).await });

                match tokio::time::timeout(deadline, task).await {
                    Ok(Ok(result)) => {
                        let elapsed = started.elapsed().as_millis() as u64;
                        (name, result, elapsed)
                    },
                    Ok(Err(join_err)) => {
                        warn!("checker {} failed: {}", name, join_err);
                        let elapsed = started.elapsed().as_millis() as u64;
                        let result = CheckResult::failure(format!("Checker {} error", name));
                        (name, result, elapsed)
                    },
                    Err(_) => {
                        warn!("checker {} exceeded its {}ms deadline", name, deadline.as_millis());
                        let result = CheckResult::failure(format!("Checker {} timed out", name));
                        (name, result, deadline.as_millis() as u64)
                    },
                }
            }
        });

        // join_all keeps output order equal to input order
        let outcomes = join_all(futures).await;

        let mut checks = Vec::with_capacity(outcomes.len());
        let mut timing = HashMap::with_capacity(outcomes.len());
        for (name, result, elapsed) in outcomes {
            checks.push(result);
            timing.insert(name, elapsed);
        }
        RegistryRun { checks, timing }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed {
        name: &'static str,
        score: u32,
        delay: Duration,
    }

    #[async_trait]
    impl Checker for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn check(&self, _url: &str) -> CheckResult {
            tokio::time::sleep(self.delay).await;
            CheckResult::hit(self.score, self.name)
        }
    }

    struct Exploding;

    #[async_trait]
    impl Checker for Exploding {
        fn name(&self) -> &str {
            "Exploding"
        }

        async fn check(&self, _url: &str) -> CheckResult {
            panic!("checker blew up");
        }
    }

    #[tokio::test]
    async fn results_follow_registration_order_not_completion_order() {
        let mut registry = CheckerRegistry::new(Duration::from_secs(5));
        registry.register(Arc::new(Fixed {
            name: "Slow",
            score: 10,
            delay: Duration::from_millis(50),
        }));
        registry.register(Arc::new(Fixed {
            name: "Fast",
            score: 20,
            delay: Duration::ZERO,
        }));

        let run = registry.run_all("https://example.com").await;
        assert_eq!(run.checks.len(), 2);
        assert_eq!(run.checks[0].score, 10);
        assert_eq!(run.checks[1].score, 20);
        assert!(run.timing.contains_key("Slow"));
        assert!(run.timing.contains_key("Fast"));
    }

    #[tokio::test]
    async fn panicking_checker_becomes_a_zero_score_result() {
        let mut registry = CheckerRegistry::new(Duration::from_secs(5));
        registry.register(Arc::new(Exploding));
        registry.register(Arc::new(Fixed {
            name: "Healthy",
            score: 30,
            delay: Duration::ZERO,
        }));

        let run = registry.run_all("https://example.com").await;
        assert_eq!(run.checks[0].score, 0);
        assert_eq!(
            run.checks[0].reason.as_deref(),
            Some("Checker Exploding error")
        );
        assert_eq!(run.checks[1].score, 30);
    }

    #[tokio::test]
    async fn overrunning_checker_is_substituted_at_the_deadline() {
        let deadline = Duration::from_millis(20);
        let mut registry = CheckerRegistry::new(deadline);
        registry.register(Arc::new(Fixed {
            name: "Stuck",
            score: 90,
            delay: Duration::from_secs(30),
        }));

        let run = registry.run_all("https://example.com").await;
        assert_eq!(run.checks[0].score, 0);
        assert_eq!(
            run.checks[0].reason.as_deref(),
            Some("Checker Stuck timed out")
        );
        // Recorded time is the deadline itself, not actual wall time
        assert_eq!(run.timing["Stuck"], deadline.as_millis() as u64);
    }

    #[tokio::test]
    async fn empty_registry_yields_empty_run() {
        let registry = CheckerRegistry::new(Duration::from_secs(1));
        assert!(registry.is_empty());
        let run = registry.run_all("https://example.com").await;
        assert!(run.checks.is_empty());
        assert!(run.timing.is_empty());
    }
}
