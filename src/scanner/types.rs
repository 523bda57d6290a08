use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of a single checker for one URL.
///
/// A checker that fails internally still produces a valid result with score 0
/// (fail open: absence of evidence is not evidence of phishing).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckResult {
    /// 0 (clean) to 100 (certain phishing)
    pub score: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasons: Option<Vec<String>>,
}

impl CheckResult {
    /// No evidence either way
    pub fn clean() -> Self {
        Self {
            score: 0,
            reason: None,
            reasons: None,
        }
    }

    pub fn hit(score: u32, reason: impl Into<String>) -> Self {
        Self {
            score,
            reason: Some(reason.into()),
            reasons: None,
        }
    }

    /// Checker-level failure downgraded to a zero-score result
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::hit(0, reason)
    }
}

/// A capability that scores a URL against one intelligence source or heuristic
#[async_trait]
pub trait Checker: Send + Sync {
    /// Stable identity; keys the timing map
    fn name(&self) -> &str;

    async fn check(&self, url: &str) -> CheckResult;
}

/// Three-way classification derived from the aggregate score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Safe,
    Suspicious,
    Phishing,
}

impl Verdict {
    /// Fixed thresholds: >= 70 phishing, >= 40 suspicious, else safe
    pub fn from_score(score: u32) -> Self {
        if score >= 70 {
            Verdict::Phishing
        } else if score >= 40 {
            Verdict::Suspicious
        } else {
            Verdict::Safe
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Safe => write!(f, "safe"),
            Verdict::Suspicious => write!(f, "suspicious"),
            Verdict::Phishing => write!(f, "phishing"),
        }
    }
}

/// Aggregate result for one scanned URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub url: String,
    /// Clamped to [0, 100]
    pub score: u32,
    pub verdict: Verdict,
    /// Every checker's reasons, flattened in registration order; not deduplicated
    pub reasons: Vec<String>,
    /// Per-checker wall time in milliseconds, recorded regardless of outcome
    #[serde(rename = "executionTimeMs")]
    pub execution_time_ms: HashMap<String, u64>,
}
