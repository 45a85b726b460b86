//! Concrete scrapers, one per kind of data source.

pub mod cache;
pub mod etcd;
pub mod node;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::desc::TypedDesc;
use crate::scraper::{Scrape, ScrapeError};

pub use cache::CacheValueScraper;
pub use etcd::EtcdValueScraper;
pub use node::{node_scraper, InvalidTargetScraper, NodeStatusScraper};

/// Label every value scraper attaches to its samples.
pub(crate) const KEY_LABEL: &str = "key";

/// Parse a raw stored value as a float, ignoring surrounding whitespace.
pub fn parse_value(key: &str, raw: &[u8]) -> Result<f64, ScrapeError> {
    let malformed = |reason: String| ScrapeError::MalformedValue {
        key: key.to_string(),
        reason,
    };
    let text = std::str::from_utf8(raw).map_err(|e| malformed(e.to_string()))?;
    text.trim()
        .parse::<f64>()
        .map_err(|_| malformed(format!("not a number: {:?}", text.trim())))
}

/// Turn `(key, raw value)` pairs into one sample per key.
///
/// Malformed values are logged, counted, and skipped; a repeated key keeps
/// its first value.
pub(crate) fn translate(
    scraper: &str,
    desc: &Arc<TypedDesc>,
    entries: impl IntoIterator<Item = (String, Vec<u8>)>,
) -> Scrape {
    let mut scrape = Scrape::default();
    let mut seen = HashSet::new();

    for (key, raw) in entries {
        if !seen.insert(key.clone()) {
            continue;
        }
        match parse_value(&key, &raw) {
            Ok(value) => scrape.samples.push(desc.render(value, [key])),
            Err(e) => {
                warn!(%scraper, error = %e, "skipping malformed value");
                scrape.skipped += 1;
            }
        }
    }

    scrape
}
