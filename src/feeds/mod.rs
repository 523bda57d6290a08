// Threat-feed download, parsing and blocklist serving

pub mod loader;
pub mod parser;

pub use loader::{FeedCandidate, FeedError, FeedLoader, FeedMatch, FeedSpec};
pub use parser::{normalize_url, FeedFormat};
