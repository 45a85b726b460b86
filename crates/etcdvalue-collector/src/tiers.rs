//! Static scraper sets, one per scrape-rate tier.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use etcdvalue_core::{Config, SourceKind};
use etcdvalue_sources::{CacheStore, CoordinationStore};

use crate::exporter::Exporter;
use crate::scraper::Scraper;
use crate::scrapers::{CacheValueScraper, EtcdValueScraper};

#[derive(Debug, Error)]
pub enum TierError {
    #[error("unknown scrape tier {0:?}")]
    UnknownTier(String),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("scraper {name:?}: {source}")]
    Descriptor {
        name: String,
        source: prometheus::Error,
    },

    #[error("scraper {0:?} reads redis but no cache client was provided")]
    MissingCache(String),
}

/// Store handles the static scrapers read from.
#[derive(Debug, Clone)]
pub struct Sources {
    pub etcd: Arc<dyn CoordinationStore>,
    pub cache: Option<Arc<dyn CacheStore>>,
}

/// Tier name → ordered scrapers. Built once at startup and only read afterwards.
#[derive(Debug, Default, Clone)]
pub struct ScraperSets {
    tiers: BTreeMap<String, Vec<Arc<dyn Scraper>>>,
}

impl ScraperSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one scraper per configured entry, grouped by tier in config order.
    pub fn build(config: &Config, sources: &Sources) -> Result<Self, BuildError> {
        let mut sets = Self::new();
        for entry in &config.scrapers {
            let descriptor_error = |source| BuildError::Descriptor {
                name: entry.name.clone(),
                source,
            };
            let scraper: Arc<dyn Scraper> = match entry.source {
                SourceKind::Etcd => Arc::new(
                    EtcdValueScraper::new(entry, Arc::clone(&sources.etcd))
                        .map_err(descriptor_error)?,
                ),
                SourceKind::Redis => {
                    let cache = sources
                        .cache
                        .as_ref()
                        .ok_or_else(|| BuildError::MissingCache(entry.name.clone()))?;
                    Arc::new(
                        CacheValueScraper::new(entry, Arc::clone(cache)).map_err(descriptor_error)?,
                    )
                }
            };
            sets.insert(&entry.tier, scraper);
        }

        for (tier, scrapers) in &sets.tiers {
            info!(%tier, scrapers = scrapers.len(), "scrape tier ready");
        }
        Ok(sets)
    }

    pub fn insert(&mut self, tier: &str, scraper: Arc<dyn Scraper>) {
        self.tiers.entry(tier.to_string()).or_default().push(scraper);
    }

    pub fn get(&self, tier: &str) -> Result<&[Arc<dyn Scraper>], TierError> {
        self.tiers
            .get(tier)
            .map(Vec::as_slice)
            .ok_or_else(|| TierError::UnknownTier(tier.to_string()))
    }

    pub fn tiers(&self) -> impl Iterator<Item = &str> {
        self.tiers.keys().map(String::as_str)
    }

    /// A fresh exporter over the tier's scrapers. Fails before any scraper runs
    /// if the tier is not configured.
    pub fn exporter(&self, tier: &str, timeout: Duration) -> Result<Exporter, TierError> {
        let scrapers = self.get(tier)?.to_vec();
        Ok(Exporter::new(tier, scrapers, timeout))
    }
}
