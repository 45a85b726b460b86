//! Node live-status scraper, built per request from `node_ip`/`domain_id`.

use std::sync::{Arc, LazyLock};

use serde_json::Value;
use tracing::warn;

use etcdvalue_sources::{NodeAgent, NodeTarget, SourceError, TargetError};

use crate::desc::{fq_name, TypedDesc, ValueKind};
use crate::scraper::{Scrape, ScrapeError, ScrapeFuture, Scraper};

/// Scraper identity for both the live and the invalid-target variant.
pub const NODE_SCRAPER_NAME: &str = "node_status";

static NODE_STATUS: LazyLock<Arc<TypedDesc>> = LazyLock::new(|| {
    TypedDesc::new(
        fq_name("node", "status"),
        "Live status item reported by the node agent.",
        &["node_ip", "domain_id", "item"],
        ValueKind::Gauge,
    )
    .expect("static node status descriptor")
});

/// Queries one node's reporting agent and exports each numeric status item.
#[derive(Debug)]
pub struct NodeStatusScraper {
    target: NodeTarget,
    agent: Arc<dyn NodeAgent>,
}

impl NodeStatusScraper {
    pub fn new(target: NodeTarget, agent: Arc<dyn NodeAgent>) -> Self {
        Self { target, agent }
    }

    pub fn target(&self) -> &NodeTarget {
        &self.target
    }

    async fn read(&self) -> Result<Scrape, ScrapeError> {
        let status = match self.agent.status(&self.target).await {
            Ok(status) => status,
            Err(SourceError::MalformedReply(reason)) => {
                return Err(ScrapeError::MalformedValue {
                    key: self.target.to_string(),
                    reason,
                });
            }
            Err(e) => return Err(e.into()),
        };
        let node_ip = self.target.node_ip.to_string();

        let mut scrape = Scrape::default();
        for (item, value) in status {
            match item_value(&value) {
                Some(v) => scrape.samples.push(NODE_STATUS.render(
                    v,
                    [node_ip.as_str(), self.target.domain_id.as_str(), item.as_str()],
                )),
                None => {
                    warn!(node = %self.target, %item, "skipping non-numeric status item");
                    scrape.skipped += 1;
                }
            }
        }
        Ok(scrape)
    }
}

/// Numbers pass through, booleans become 1/0, numeric strings are parsed.
fn item_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl Scraper for NodeStatusScraper {
    fn name(&self) -> &str {
        NODE_SCRAPER_NAME
    }

    fn describe(&self) -> Vec<Arc<TypedDesc>> {
        vec![Arc::clone(&*NODE_STATUS)]
    }

    fn scrape(&self) -> ScrapeFuture<'_> {
        Box::pin(self.read())
    }
}

/// Stands in for a node scraper when the request did not name a target.
/// Every scrape fails, which shows up as a failing observability sample.
#[derive(Debug)]
pub struct InvalidTargetScraper {
    reason: String,
}

impl InvalidTargetScraper {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Scraper for InvalidTargetScraper {
    fn name(&self) -> &str {
        NODE_SCRAPER_NAME
    }

    fn describe(&self) -> Vec<Arc<TypedDesc>> {
        vec![Arc::clone(&*NODE_STATUS)]
    }

    fn scrape(&self) -> ScrapeFuture<'_> {
        let err = ScrapeError::InvalidTarget(self.reason.clone());
        Box::pin(std::future::ready(Err(err)))
    }
}

/// Build the scraper for a node-scoped request.
///
/// Missing (or empty) parameters give an [`InvalidTargetScraper`]; present but
/// malformed ones are rejected so the caller can answer with a client error.
pub fn node_scraper(
    node_ip: Option<&str>,
    domain_id: Option<&str>,
    agent: Arc<dyn NodeAgent>,
) -> Result<Arc<dyn Scraper>, TargetError> {
    let node_ip = node_ip.filter(|s| !s.is_empty());
    let domain_id = domain_id.filter(|s| !s.is_empty());

    match (node_ip, domain_id) {
        (Some(ip), Some(domain)) => {
            let target = NodeTarget::parse(ip, domain)?;
            Ok(Arc::new(NodeStatusScraper::new(target, agent)))
        }
        (ip, domain) => {
            let missing: Vec<&str> = [("node_ip", ip), ("domain_id", domain)]
                .into_iter()
                .filter(|(_, v)| v.is_none())
                .map(|(name, _)| name)
                .collect();
            Ok(Arc::new(InvalidTargetScraper::new(format!(
                "missing {}",
                missing.join(" and ")
            ))))
        }
    }
}
