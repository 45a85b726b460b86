//! Coordination-store value scraper.

use std::sync::Arc;

use tracing::debug;

use etcdvalue_core::ScraperConfig;
use etcdvalue_sources::CoordinationStore;

use crate::desc::{fq_name, TypedDesc};
use crate::scraper::{Scrape, ScrapeError, ScrapeFuture, Scraper};
use crate::scrapers::{translate, KEY_LABEL};

/// Reads configured keys and prefixes from etcd and exports every numeric
/// value as `obj_{metric}{key="..."}`.
#[derive(Debug)]
pub struct EtcdValueScraper {
    name: String,
    keys: Vec<String>,
    prefixes: Vec<String>,
    desc: Arc<TypedDesc>,
    store: Arc<dyn CoordinationStore>,
}

impl EtcdValueScraper {
    pub fn new(
        config: &ScraperConfig,
        store: Arc<dyn CoordinationStore>,
    ) -> prometheus::Result<Self> {
        let desc = TypedDesc::new(
            fq_name("", &config.metric),
            config.help_text(),
            &[KEY_LABEL],
            config.kind.into(),
        )?;
        Ok(Self {
            name: config.name.clone(),
            keys: config.keys.clone(),
            prefixes: config.prefixes.clone(),
            desc,
            store,
        })
    }

    async fn read(&self) -> Result<Scrape, ScrapeError> {
        let mut entries = Vec::new();
        for key in &self.keys {
            entries.extend(self.store.get(key).await?);
        }
        for prefix in &self.prefixes {
            entries.extend(self.store.get_prefix(prefix).await?);
        }
        debug!(scraper = %self.name, values = entries.len(), "etcd values read");

        Ok(translate(
            &self.name,
            &self.desc,
            entries.into_iter().map(|kv| (kv.key, kv.value)),
        ))
    }
}

impl Scraper for EtcdValueScraper {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> Vec<Arc<TypedDesc>> {
        vec![Arc::clone(&self.desc)]
    }

    fn scrape(&self) -> ScrapeFuture<'_> {
        Box::pin(self.read())
    }
}
