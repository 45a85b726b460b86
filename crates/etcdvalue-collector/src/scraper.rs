//! The scraper contract.
//!
//! A scraper owns its target and store handle from construction on, so the
//! exporter can run any mix of them with the same parameterless call.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use etcdvalue_sources::SourceError;

use crate::desc::{Sample, TypedDesc};

/// Boxed future returned by [`Scraper::scrape`].
pub type ScrapeFuture<'a> = Pin<Box<dyn Future<Output = Result<Scrape, ScrapeError>> + Send + 'a>>;

/// Output of one successful scrape.
#[derive(Debug, Default)]
pub struct Scrape {
    pub samples: Vec<Sample>,
    /// Stored values that were skipped because they could not be parsed.
    pub skipped: u64,
}

impl Scrape {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            skipped: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("malformed value for {key:?}: {reason}")]
    MalformedValue { key: String, reason: String },

    #[error("scrape timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid scrape target: {0}")]
    InvalidTarget(String),
}

pub trait Scraper: Send + Sync + fmt::Debug {
    /// Identity used to label this scraper's observability samples.
    fn name(&self) -> &str;

    /// Every descriptor [`Scraper::scrape`] may ever emit.
    fn describe(&self) -> Vec<Arc<TypedDesc>>;

    /// Read the store and translate what it holds into samples. Missing data
    /// yields an empty [`Scrape`], not an error.
    fn scrape(&self) -> ScrapeFuture<'_>;
}
