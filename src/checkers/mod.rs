// The built-in checker set: four blocklist feeds, two keyed external
// APIs, and local heuristics

pub mod heuristics;
pub mod openphish;
pub mod phishstats;
pub mod phishtank;
pub mod safe_browsing;
pub mod urlhaus;
pub mod web_risk;

pub use heuristics::HeuristicsChecker;
pub use openphish::OpenPhishChecker;
pub use phishstats::PhishStatsChecker;
pub use phishtank::PhishTankChecker;
pub use safe_browsing::SafeBrowsingChecker;
pub use urlhaus::UrlhausChecker;
pub use web_risk::WebRiskChecker;
