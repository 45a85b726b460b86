//! etcdvalue-core — configuration for the etcdvalue exporter.
//!
//! Parses the TOML config file into a [`Config`] that is validated once at
//! startup and then passed explicitly to the scraper-set builder, the store
//! clients, and the HTTP router.

pub mod config;
pub mod error;

pub use config::{
    AuthConfig, Config, EtcdConfig, MetricKind, NodeAgentConfig, RedisConfig, ScraperConfig,
    SourceKind, CONFIG_CHECK_INTERVAL, DEFAULT_NODE_AGENT_PORT, SCRAPE_RATE_MEDIUM,
    parse_duration,
};
pub use error::{ConfigError, ConfigResult};
