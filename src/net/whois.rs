// Domain registration lookup is an external collaborator; only the interface
// lives here. The heuristics checker consumes it through a HashCache so a
// paid/rate-limited backend is queried at most once per domain per TTL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WhoisError {
    #[error("domain lookup failed: {0}")]
    Lookup(String),
}

/// Registration facts for one domain, as far as the backend knows them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainInfo {
    pub registrar: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub updated_date: Option<DateTime<Utc>>,
}

impl DomainInfo {
    /// Whole days since registration, when the creation date is known
    pub fn age_days(&self, now: DateTime<Utc>) -> Option<i64> {
        self.creation_date.map(|created| (now - created).num_days())
    }
}

#[async_trait]
pub trait DomainInfoProvider: Send + Sync {
    async fn lookup(&self, domain: &str) -> Result<DomainInfo, WhoisError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn age_days_requires_creation_date() {
        let now = Utc::now();
        assert_eq!(DomainInfo::default().age_days(now), None);

        let info = DomainInfo {
            creation_date: Some(now - Duration::days(45)),
            ..Default::default()
        };
        assert_eq!(info.age_days(now), Some(45));
    }
}
