//! Cache-store value scraper.

use std::sync::Arc;

use etcdvalue_core::ScraperConfig;
use etcdvalue_sources::CacheStore;

use crate::desc::{fq_name, TypedDesc};
use crate::scraper::{Scrape, ScrapeError, ScrapeFuture, Scraper};
use crate::scrapers::{translate, KEY_LABEL};

/// Reads configured keys from redis with one `MGET`.
#[derive(Debug)]
pub struct CacheValueScraper {
    name: String,
    keys: Vec<String>,
    desc: Arc<TypedDesc>,
    cache: Arc<dyn CacheStore>,
}

impl CacheValueScraper {
    pub fn new(config: &ScraperConfig, cache: Arc<dyn CacheStore>) -> prometheus::Result<Self> {
        let desc = TypedDesc::new(
            fq_name("", &config.metric),
            config.help_text(),
            &[KEY_LABEL],
            config.kind.into(),
        )?;
        Ok(Self {
            name: config.name.clone(),
            keys: config.keys.clone(),
            desc,
            cache,
        })
    }

    async fn read(&self) -> Result<Scrape, ScrapeError> {
        let values = self.cache.mget(&self.keys).await?;
        let entries = self
            .keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key.clone(), v)));
        Ok(translate(&self.name, &self.desc, entries))
    }
}

impl Scraper for CacheValueScraper {
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
