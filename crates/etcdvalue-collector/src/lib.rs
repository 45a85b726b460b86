//! etcdvalue-collector — turns stored values into Prometheus samples.
//!
//! A [`Scraper`] reads one source and translates what it finds into
//! [`Sample`]s against descriptors it announced up front. An [`Exporter`]
//! runs a tier's scrapers for exactly one request and adds per-scraper
//! observability samples; [`render_exporter`] registers the result into a
//! fresh registry and encodes the text exposition.

pub mod desc;
pub mod exporter;
pub mod registry;
pub mod scraper;
pub mod scrapers;
pub mod tiers;

pub use desc::{fq_name, Sample, TypedDesc, ValueKind, NAMESPACE};
pub use exporter::Exporter;
pub use registry::{render_collection, render_exporter, Collection, CONTENT_TYPE};
pub use scraper::{Scrape, ScrapeError, ScrapeFuture, Scraper};
pub use scrapers::{
    node_scraper, parse_value, CacheValueScraper, EtcdValueScraper, InvalidTargetScraper,
    NodeStatusScraper,
};
pub use tiers::{BuildError, ScraperSets, Sources, TierError};
