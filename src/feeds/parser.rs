// Feed wire formats are external, untrusted input: malformed lines and
// records are skipped, never allowed to abort a whole ingest.

use url::Url;

/// How a candidate endpoint's payload is parsed into URL entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFormat {
    /// One URL per line; `#` comments and blank lines skipped
    Lines,
    /// Quoted CSV with the URL at a fixed column; header and `#` lines skipped
    Csv { url_column: usize },
    /// Whole-document JSON array of objects carrying the URL in a named field.
    /// Requires buffering the full payload, so loaders may skip it on
    /// memory-constrained instances.
    JsonArray { url_field: &'static str },
}

impl FeedFormat {
    /// True when the format can be consumed line-by-line without buffering
    pub fn is_streaming(&self) -> bool {
        !matches!(self, FeedFormat::JsonArray { .. })
    }
}

/// Canonical form used for both ingestion and membership checks: trimmed,
/// scheme and host lowercased, a single trailing slash stripped.
/// Unparseable input falls back to a plain trim so feeds carrying bare
/// hostnames still round-trip.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(parsed) => {
            // Url::parse already case-folds scheme and host
            let mut s = parsed.to_string();
            if s.ends_with('/') && parsed.query().is_none() && parsed.fragment().is_none() {
                s.pop();
            }
            s
        },
        Err(_) => trimmed.to_string(),
    }
}

/// Hostname of a feed entry, for the lower-confidence host sets
pub fn host_of(raw: &str) -> Option<String> {
    let candidate = if raw.contains("://") {
        raw.trim().to_string()
    } else {
        format!("http://{}", raw.trim())
    };
    Url::parse(&candidate)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

/// Extracts the URL from one line of a streaming feed, or `None` when the
/// line carries no entry (comment, header, malformed row)
pub fn extract_from_line(format: &FeedFormat, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    match format {
        FeedFormat::Lines => Some(line.to_string()),
        FeedFormat::Csv { url_column } => {
            let fields = split_csv_line(line);
            let field = fields.get(*url_column)?;
            if field.is_empty() || is_csv_header_field(field) {
                return None;
            }
            Some(field.clone())
        },
        FeedFormat::JsonArray { .. } => None,
    }
}

/// Extracts every URL from a buffered JSON array document
pub fn extract_from_json(url_field: &str, body: &[u8]) -> Result<Vec<String>, serde_json::Error> {
    let doc: serde_json::Value = serde_json::from_slice(body)?;

    // Either a bare array or an object wrapping one (URLhaus: {"urls": [...]})
    let entries = match &doc {
        serde_json::Value::Array(entries) => entries.as_slice(),
        serde_json::Value::Object(map) => map
            .values()
            .find_map(|v| v.as_array())
            .map(|a| a.as_slice())
            .unwrap_or(&[]),
        _ => &[],
    };

    Ok(entries
        .iter()
        .filter_map(|entry| entry.get(url_field))
        .filter_map(|v| v.as_str())
        .map(|s| s.to_string())
        .collect())
}

/// Quote-aware CSV field split; commas inside quoted fields do not delimit
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current = String::new();
            },
            _ => current.push(ch),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

fn is_csv_header_field(field: &str) -> bool {
    matches!(field, "url" | "phish_id" | "id")
}
