// Generic threat-feed ingestion: download, parse, batch into temporary
// Redis sets, then atomically RENAME over the live sets so membership
// checks never observe a half-built blocklist.

use std::io::{BufRead, Read};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use flate2::read::MultiGzDecoder;
use futures_util::{future, stream, StreamExt};
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use crate::app_config::CONFIG;
use crate::db::RedisPool;

use super::parser::{extract_from_json, extract_from_line, host_of, normalize_url, FeedFormat};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed download failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("feed endpoint returned HTTP {0}")]
    BadStatus(u16),
    #[error("feed endpoint returned unexpected content type: {0}")]
    UnexpectedContentType(String),
    #[error("feed download exceeded the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("feed stream error: {0}")]
    Io(#[from] std::io::Error),
    #[error("feed document was not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("feed produced no entries")]
    Empty,
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("every candidate endpoint failed")]
    Exhausted,
}

/// One downloadable endpoint for a feed. Candidates are tried in order
/// until one yields a non-empty blocklist.
#[derive(Debug, Clone)]
pub struct FeedCandidate {
    pub url: String,
    pub format: FeedFormat,
    /// Skipped entirely when `low_memory_mode` is set. Used for bulk JSON
    /// dumps that must be buffered whole.
    pub heavy: bool,
}

/// Static description of a feed: where to fetch it, how often, and which
/// Redis sets hold its entries
#[derive(Debug, Clone)]
pub struct FeedSpec {
    pub name: &'static str,
    pub candidates: Vec<FeedCandidate>,
    pub refresh_interval: Duration,
    /// After a failed refresh, no retry is attempted for this long
    pub failure_cooldown: Duration,
    pub url_set_key: String,
    /// Some feeds also maintain a lower-confidence set of bare hostnames
    pub host_set_key: Option<String>,
}

/// Outcome of a blocklist membership check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMatch {
    /// The exact normalized URL is listed
    Url,
    /// Only the hostname is listed
    Host,
    Miss,
}

/// What a refresh attempt should do given the persisted feed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshAction {
    /// Data is still fresh
    Skip,
    /// Data is stale but a recent failure puts retries on cooldown
    Throttled,
    Refresh,
}

/// Pure staleness decision. The failure cooldown only suppresses retries,
/// it never makes stale data count as fresh.
pub fn refresh_action(
    now_ms: i64,
    last_update_ms: Option<i64>,
    last_failure_ms: Option<i64>,
    interval: Duration,
    cooldown: Duration,
) -> RefreshAction {
    if let Some(updated) = last_update_ms {
        if now_ms - updated < interval.as_millis() as i64 {
            return RefreshAction::Skip;
        }
    }
    if let Some(failed) = last_failure_ms {
        if now_ms - failed < cooldown.as_millis() as i64 {
            return RefreshAction::Throttled;
        }
    }
    RefreshAction::Refresh
}

/// Downloads and serves one threat feed. Cloneable; clones share the spec
/// and the connection pool.
#[derive(Clone)]
pub struct FeedLoader {
    spec: Arc<FeedSpec>,
    pool: RedisPool,
    http: reqwest::Client,
}

impl FeedLoader {
    pub fn new(spec: FeedSpec, pool: RedisPool, http: reqwest::Client) -> Self {
        Self {
            spec: Arc::new(spec),
            pool,
            http,
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    fn last_update_key(&self) -> String {
        format!("{}:last_update", self.spec.name)
    }

    fn last_failure_key(&self) -> String {
        format!("{}:last_failure", self.spec.name)
    }

    fn tmp_key(live: &str) -> String {
        format!("{}:tmp", live)
    }

    /// Refresh if stale and not on cooldown. Errors are logged, not
    /// returned; the previous blocklist stays live on failure.
    pub async fn refresh(&self) {
        let now = Utc::now().timestamp_millis();
        let last_update = self.read_state(&self.last_update_key()).await;
        let last_failure = self.read_state(&self.last_failure_key()).await;

        match refresh_action(
            now,
            last_update,
            last_failure,
            self.spec.refresh_interval,
            self.spec.failure_cooldown,
        ) {
            RefreshAction::Skip => {
                debug!("{}: blocklist still fresh, skipping refresh", self.spec.name);
            },
            RefreshAction::Throttled => {
                info!(
                    "{}: refresh suppressed, recent failure is on cooldown",
                    self.spec.name
                );
            },
            RefreshAction::Refresh => {
                if let Err(e) = self.force_refresh().await {
                    warn!("{}: refresh failed: {}", self.spec.name, e);
                }
            },
        }
    }

    /// Run an ingest cycle now, regardless of staleness or cooldown
    pub async fn force_refresh(&self) -> Result<(), FeedError> {
        for candidate in &self.spec.candidates {
            if candidate.heavy && CONFIG.feeds.low_memory_mode {
                debug!(
                    "{}: skipping bulk candidate {} in low memory mode",
                    self.spec.name, candidate.url
                );
                continue;
            }

            match self.ingest_candidate(candidate).await {
                Ok(count) => {
                    self.record_success().await;
                    info!(
                        "{}: loaded {} entries from {}",
                        self.spec.name, count, candidate.url
                    );
                    return Ok(());
                },
                Err(e) => {
                    warn!(
                        "{}: candidate {} failed: {}",
                        self.spec.name, candidate.url, e
                    );
                    self.drop_temp_sets().await;
                },
            }
        }

        self.record_failure().await;
        Err(FeedError::Exhausted)
    }

    /// Checks a URL against the live blocklist. A never-populated feed is
    /// loaded synchronously first; a merely stale one is refreshed in the
    /// background while this call answers from the existing data. Redis
    /// failures answer `Miss` so a broken cache never blocks scans.
    pub async fn lookup(&self, url: &str) -> FeedMatch {
        let last_update = self.read_state(&self.last_update_key()).await;

        if last_update.is_none() {
            let populated = self
                .pool
                .exists(&self.spec.url_set_key)
                .await
                .unwrap_or(false);
            if !populated {
                // The failure cooldown applies here too, otherwise a dead
                // endpoint turns every scan into a full candidate sweep
                let last_failure = self.read_state(&self.last_failure_key()).await;
                let action = refresh_action(
                    Utc::now().timestamp_millis(),
                    None,
                    last_failure,
                    self.spec.refresh_interval,
                    self.spec.failure_cooldown,
                );
                if action == RefreshAction::Refresh {
                    info!("{}: blocklist empty, loading before first lookup", self.spec.name);
                    if let Err(e) = self.force_refresh().await {
                        warn!("{}: initial load failed: {}", self.spec.name, e);
                    }
                } else {
                    debug!(
                        "{}: initial load suppressed, recent failure is on cooldown",
                        self.spec.name
                    );
                }
            }
        } else {
            let last_failure = self.read_state(&self.last_failure_key()).await;
            let action = refresh_action(
                Utc::now().timestamp_millis(),
                last_update,
                last_failure,
                self.spec.refresh_interval,
                self.spec.failure_cooldown,
            );
            if action == RefreshAction::Refresh {
                let loader = self.clone();
                tokio::spawn(async move {
                    loader.refresh().await;
                });
            }
        }

        let normalized = normalize_url(url);
        match self.pool.sismember(&self.spec.url_set_key, &normalized).await {
            Ok(true) => return FeedMatch::Url,
            Ok(false) => {},
            Err(e) => {
                warn!("{}: membership check failed: {}", self.spec.name, e);
                return FeedMatch::Miss;
            },
        }

        if let Some(host_key) = &self.spec.host_set_key {
            if let Some(host) = host_of(url) {
                match self.pool.sismember(host_key, &host).await {
                    Ok(true) => return FeedMatch::Host,
                    Ok(false) => {},
                    Err(e) => {
                        warn!("{}: host membership check failed: {}", self.spec.name, e);
                    },
                }
            }
        }

        FeedMatch::Miss
    }

    async fn ingest_candidate(&self, candidate: &FeedCandidate) -> Result<u64, FeedError> {
        let resp = self.http.get(&candidate.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::BadStatus(status.as_u16()));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        // Parked domains sometimes answer feed URLs with a placeholder image
        if content_type.starts_with("image/") {
            return Err(FeedError::UnexpectedContentType(content_type));
        }

        let mut stream = resp.bytes_stream();

        // Sniff the leading bytes; some mirrors serve gzip without a .gz
        // suffix or a content-encoding marker
        let head = loop {
            match stream.next().await {
                Some(chunk) => {
                    let bytes = chunk?;
                    if !bytes.is_empty() {
                        break bytes;
                    }
                },
                None => return Err(FeedError::Empty),
            }
        };
        let gzipped = head.starts_with(&GZIP_MAGIC);
        let body = stream::once(future::ready(Ok(head))).chain(stream);

        let mut urls = SetBatcher::new(
            &self.pool,
            Self::tmp_key(&self.spec.url_set_key),
            CONFIG.feeds.batch_size,
        );
        let mut hosts = self.spec.host_set_key.as_deref().map(|key| {
            SetBatcher::new(&self.pool, Self::tmp_key(key), CONFIG.feeds.batch_size)
        });

        let cap = CONFIG.feeds.max_download_bytes as u64;

        if candidate.format.is_streaming() && !gzipped {
            // Line-by-line straight off the wire, cap enforced per chunk
            let mut seen: u64 = 0;
            let capped = body.map(move |chunk| {
                chunk
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
                    .and_then(|bytes| {
                        seen += bytes.len() as u64;
                        if seen > cap {
                            Err(std::io::Error::new(
                                std::io::ErrorKind::InvalidData,
                                "download size limit exceeded",
                            ))
                        } else {
                            Ok(bytes)
                        }
                    })
            });
            let reader = StreamReader::new(capped);
            let mut lines = tokio::io::BufReader::new(reader).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(raw) = extract_from_line(&candidate.format, &line) {
                    Self::push_entry(&raw, &mut urls, &mut hosts).await?;
                }
            }
        } else {
            // Buffer whole, then gunzip if the magic bytes said so
            let mut body = body;
            let mut buf = Vec::new();
            while let Some(chunk) = body.next().await {
                let bytes = chunk?;
                if buf.len() as u64 + bytes.len() as u64 > cap {
                    return Err(FeedError::TooLarge { limit: cap });
                }
                buf.extend_from_slice(&bytes);
            }
            let buf = if gzipped { Self::decompress(&buf)? } else { buf };

            match &candidate.format {
                FeedFormat::JsonArray { url_field } => {
                    for raw in extract_from_json(url_field, &buf)? {
                        Self::push_entry(&raw, &mut urls, &mut hosts).await?;
                    }
                },
                format => {
                    for line in BufRead::lines(buf.as_slice()) {
                        let line = line?;
                        if let Some(raw) = extract_from_line(format, &line) {
                            Self::push_entry(&raw, &mut urls, &mut hosts).await?;
                        }
                    }
                },
            }
        }

        let url_count = urls.finish().await?;
        if url_count == 0 {
            return Err(FeedError::Empty);
        }
        let host_count = match hosts {
            Some(batcher) => batcher.finish().await?,
            None => 0,
        };

        // Promote: exact URLs first, hosts right after. The window between
        // the two renames is accepted.
        self.pool
            .rename(&Self::tmp_key(&self.spec.url_set_key), &self.spec.url_set_key)
            .await?;
        if let Some(host_key) = &self.spec.host_set_key {
            if host_count > 0 {
                self.pool.rename(&Self::tmp_key(host_key), host_key).await?;
            }
        }

        // Report the cardinality of the set just published
        let live = self.pool.scard(&self.spec.url_set_key).await.unwrap_or(url_count);
        Ok(live)
    }

    /// Gunzip with the same size cap applied to the decompressed output
    fn decompress(body: &[u8]) -> Result<Vec<u8>, FeedError> {
        let cap = CONFIG.feeds.max_download_bytes as u64;
        let mut out = Vec::new();
        let mut reader = MultiGzDecoder::new(body).take(cap + 1);
        reader.read_to_end(&mut out)?;
        if out.len() as u64 > cap {
            return Err(FeedError::TooLarge { limit: cap });
        }
        Ok(out)
    }

    async fn push_entry(
        raw: &str,
        urls: &mut SetBatcher<'_>,
        hosts: &mut Option<SetBatcher<'_>>,
    ) -> Result<(), FeedError> {
        urls.push(normalize_url(raw)).await?;
        if let Some(hosts) = hosts {
            if let Some(host) = host_of(raw) {
                hosts.push(host).await?;
            }
        }
        Ok(())
    }

    async fn read_state(&self, key: &str) -> Option<i64> {
        match self.pool.get_string(key).await {
            Ok(Some(raw)) => raw.parse().ok(),
            Ok(None) => None,
            Err(e) => {
                warn!("{}: state read failed: {}", self.spec.name, e);
                None
            },
        }
    }

    async fn record_success(&self) {
        let now = Utc::now().timestamp_millis().to_string();
        if let Err(e) = self.pool.set_string(&self.last_update_key(), &now).await {
            warn!("{}: could not persist refresh timestamp: {}", self.spec.name, e);
        }
        let failure_key = self.last_failure_key();
        if let Err(e) = self.pool.del(&[failure_key.as_str()]).await {
            warn!("{}: could not clear failure marker: {}", self.spec.name, e);
        }
    }

    async fn record_failure(&self) {
        let now = Utc::now().timestamp_millis().to_string();
        if let Err(e) = self.pool.set_string(&self.last_failure_key(), &now).await {
            warn!("{}: could not persist failure marker: {}", self.spec.name, e);
        }
    }

    async fn drop_temp_sets(&self) {
        let url_tmp = Self::tmp_key(&self.spec.url_set_key);
        let mut keys = vec![url_tmp];
        if let Some(host_key) = &self.spec.host_set_key {
            keys.push(Self::tmp_key(host_key));
        }
        let refs: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        if let Err(e) = self.pool.del(&refs).await {
            warn!("{}: could not drop temp sets: {}", self.spec.name, e);
        }
    }
}

/// Accumulates set members and flushes them in fixed-size SADD batches,
/// yielding between flushes so a large ingest does not hog the executor
struct SetBatcher<'a> {
    pool: &'a RedisPool,
    key: String,
    buf: Vec<String>,
    batch_size: usize,
    total: u64,
}

impl<'a> SetBatcher<'a> {
    fn new(pool: &'a RedisPool, key: String, batch_size: usize) -> Self {
        Self {
            pool,
            key,
            buf: Vec::with_capacity(batch_size),
            batch_size,
            total: 0,
        }
    }

    async fn push(&mut self, member: String) -> Result<(), FeedError> {
        self.buf.push(member);
        if self.buf.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), FeedError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.total += self.pool.sadd_batch(&self.key, &self.buf).await?;
        self.buf.clear();
        tokio::task::yield_now().await;
        Ok(())
    }

    /// Flush the tail and return how many members were newly added
    async fn finish(mut self) -> Result<u64, FeedError> {
        self.flush().await?;
        Ok(self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);
    const COOLDOWN: Duration = Duration::from_secs(900);

    #[test]
    fn first_run_always_refreshes() {
        assert_eq!(
            refresh_action(1_000_000, None, None, HOUR, COOLDOWN),
            RefreshAction::Refresh
        );
    }

    #[test]
    fn fresh_data_skips_even_with_recent_failure() {
        let now = 10_000_000;
        assert_eq!(
            refresh_action(now, Some(now - 60_000), None, HOUR, COOLDOWN),
            RefreshAction::Skip
        );
        // A failure marker does not shorten the validity window
        assert_eq!(
            refresh_action(now, Some(now - 60_000), Some(now - 1_000), HOUR, COOLDOWN),
            RefreshAction::Skip
        );
    }

    #[test]
    fn stale_data_with_recent_failure_is_throttled() {
        let now = 10_000_000;
        let stale = now - 2 * HOUR.as_millis() as i64;
        assert_eq!(
            refresh_action(now, Some(stale), Some(now - 60_000), HOUR, COOLDOWN),
            RefreshAction::Throttled
        );
    }

    #[test]
    fn cooldown_expiry_allows_retry() {
        let now = 10_000_000;
        let stale = now - 2 * HOUR.as_millis() as i64;
        let old_failure = now - COOLDOWN.as_millis() as i64 - 1;
        assert_eq!(
            refresh_action(now, Some(stale), Some(old_failure), HOUR, COOLDOWN),
            RefreshAction::Refresh
        );
    }

    #[test]
    fn failure_alone_throttles_an_unpopulated_feed() {
        let now = 10_000_000;
        assert_eq!(
            refresh_action(now, None, Some(now - 1_000), HOUR, COOLDOWN),
            RefreshAction::Throttled
        );
    }

    #[test]
    fn temp_keys_are_derived_from_live_keys() {
        assert_eq!(FeedLoader::tmp_key("phishtank:urls"), "phishtank:urls:tmp");
    }

    #[test]
    fn gzip_payloads_are_recognized_by_magic_bytes() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let plain = b"http://evil.example/a\nhttp://evil.example/b\n";
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(plain).unwrap();
        let compressed = encoder.finish().unwrap();

        // The sniff must work without any filename or content-type hint
        assert!(compressed.starts_with(&GZIP_MAGIC));
        assert!(!plain.starts_with(&GZIP_MAGIC));

        assert_eq!(FeedLoader::decompress(&compressed).unwrap(), plain);
    }
}
