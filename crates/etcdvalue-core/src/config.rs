//! etcdvalue_exporter.toml configuration parser.
//!
//! The loaded [`Config`] is handed explicitly to whoever needs it (scraper
//! set builder, router, store clients); nothing reads it from a global.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Port the per-node reporting agent listens on unless configured otherwise.
pub const DEFAULT_NODE_AGENT_PORT: u16 = 5051;

/// The medium scrape-rate tier.
pub const SCRAPE_RATE_MEDIUM: &str = "mr";

/// How long to wait before re-checking for a config file that does not exist yet.
pub const CONFIG_CHECK_INTERVAL: Duration = Duration::from_secs(60);

const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REDIS_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_NODE_AGENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Metric name prefixes owned by the exporter itself.
const RESERVED_METRIC_PREFIXES: &[&str] = &["exporter_", "node_"];

static METRIC_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("metric name pattern"));

/// Tier names end up in route paths.
static TIER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("tier name pattern"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout: String,
    #[serde(default)]
    pub auth: AuthConfig,
    pub etcd: EtcdConfig,
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub node_agent: NodeAgentConfig,
    #[serde(default)]
    pub scrapers: Vec<ScraperConfig>,
}

/// HTTP basic authentication. Disabled unless both fields are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl AuthConfig {
    pub fn enabled(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtcdConfig {
    pub endpoints: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
}

impl EtcdConfig {
    pub fn connect_timeout(&self) -> Duration {
        parse_duration(&self.connect_timeout).unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub address: String,
    pub password: Option<String>,
    #[serde(default)]
    pub db: u32,
    #[serde(default = "default_redis_timeout")]
    pub timeout: String,
}

impl RedisConfig {
    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(DEFAULT_REDIS_TIMEOUT)
    }
}

/// Where node-scoped requests find the per-node reporting agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeAgentConfig {
    #[serde(default = "default_node_agent_port")]
    pub port: u16,
    #[serde(default = "default_node_agent_path")]
    pub path: String,
    #[serde(default = "default_node_agent_timeout")]
    pub timeout: String,
    /// Tier label attached to node-scoped exporters.
    #[serde(default = "default_tier")]
    pub tier: String,
}

impl Default for NodeAgentConfig {
    fn default() -> Self {
        Self {
            port: default_node_agent_port(),
            path: default_node_agent_path(),
            timeout: default_node_agent_timeout(),
            tier: default_tier(),
        }
    }
}

impl NodeAgentConfig {
    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(DEFAULT_NODE_AGENT_TIMEOUT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Etcd,
    Redis,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    #[default]
    Gauge,
    Counter,
}

/// One value scraper: a set of keys read from a store and exported as one metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    #[serde(default = "default_tier")]
    pub tier: String,
    pub name: String,
    pub source: SourceKind,
    /// Metric name without the `obj_` namespace.
    pub metric: String,
    pub help: Option<String>,
    #[serde(default)]
    pub kind: MetricKind,
    #[serde(default)]
    pub keys: Vec<String>,
    /// Key prefixes (etcd only); every key under a prefix becomes a sample.
    #[serde(default)]
    pub prefixes: Vec<String>,
}

impl ScraperConfig {
    pub fn help_text(&self) -> String {
        match &self.help {
            Some(help) if !help.trim().is_empty() => help.clone(),
            _ => {
                let source = match self.source {
                    SourceKind::Etcd => "etcd",
                    SourceKind::Redis => "redis",
                };
                format!("Value of {} read from {source}.", self.metric)
            }
        }
    }
}

impl Config {
    /// Read, parse, and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn scrape_timeout(&self) -> Duration {
        parse_duration(&self.scrape_timeout).unwrap_or(DEFAULT_SCRAPE_TIMEOUT)
    }

    /// All tiers that have at least one scraper configured.
    pub fn tiers(&self) -> BTreeSet<&str> {
        self.scrapers.iter().map(|s| s.tier.as_str()).collect()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.etcd.endpoints.is_empty() {
            return Err(invalid("etcd.endpoints must not be empty"));
        }

        check_duration("scrape_timeout", &self.scrape_timeout)?;
        check_duration("etcd.connect_timeout", &self.etcd.connect_timeout)?;
        check_duration("node_agent.timeout", &self.node_agent.timeout)?;
        if let Some(redis) = &self.redis {
            check_duration("redis.timeout", &redis.timeout)?;
        }
        if !TIER_NAME.is_match(&self.node_agent.tier) {
            return Err(invalid(format!(
                "invalid node_agent.tier {:?}",
                self.node_agent.tier
            )));
        }
        if !self.node_agent.path.starts_with('/') {
            return Err(invalid("node_agent.path must start with '/'"));
        }

        let mut names = HashSet::new();
        let mut metrics = HashSet::new();
        for s in &self.scrapers {
            if s.name.is_empty() {
                return Err(invalid("scraper name must not be empty"));
            }
            if !TIER_NAME.is_match(&s.tier) {
                return Err(invalid(format!("invalid tier {:?} for scraper {:?}", s.tier, s.name)));
            }
            if !names.insert((s.tier.as_str(), s.name.as_str())) {
                return Err(invalid(format!(
                    "duplicate scraper {:?} in tier {:?}",
                    s.name, s.tier
                )));
            }
            if !METRIC_NAME.is_match(&s.metric) {
                return Err(invalid(format!("invalid metric name {:?}", s.metric)));
            }
            if RESERVED_METRIC_PREFIXES
                .iter()
                .any(|prefix| s.metric.starts_with(prefix))
            {
                return Err(invalid(format!(
                    "metric name {:?} uses a reserved prefix",
                    s.metric
                )));
            }
            if !metrics.insert((s.tier.as_str(), s.metric.as_str())) {
                return Err(invalid(format!(
                    "metric {:?} exported twice in tier {:?}",
                    s.metric, s.tier
                )));
            }
            if s.keys.is_empty() && s.prefixes.is_empty() {
                return Err(invalid(format!(
                    "scraper {:?} needs at least one key or prefix",
                    s.name
                )));
            }
            if s.source == SourceKind::Redis {
                if !s.prefixes.is_empty() {
                    return Err(invalid(format!(
                        "scraper {:?}: prefixes are only supported for etcd",
                        s.name
                    )));
                }
                if self.redis.is_none() {
                    return Err(invalid(format!(
                        "scraper {:?} reads redis but no [redis] section is configured",
                        s.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn check_duration(field: &str, value: &str) -> ConfigResult<()> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(()),
        _ => Err(invalid(format!("{field}: invalid duration {value:?}"))),
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

fn default_address() -> String {
    "0.0.0.0:9527".to_string()
}

fn default_scrape_timeout() -> String {
    "10s".to_string()
}

fn default_connect_timeout() -> String {
    "5s".to_string()
}

fn default_redis_timeout() -> String {
    "2s".to_string()
}

fn default_node_agent_port() -> u16 {
    DEFAULT_NODE_AGENT_PORT
}

fn default_node_agent_path() -> String {
    "/status".to_string()
}

fn default_node_agent_timeout() -> String {
    "5s".to_string()
}

fn default_tier() -> String {
    SCRAPE_RATE_MEDIUM.to_string()
}
