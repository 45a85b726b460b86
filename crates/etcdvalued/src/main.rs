//! etcdvalued — the etcdvalue exporter daemon.
//!
//! Loads the config file, connects the read-only store clients, builds the
//! static scraper sets once and serves them over HTTP until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! etcdvalued --config conf/etcdvalue_exporter.toml --log-format json
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use etcdvalue_api::{build_router, ApiState};
use etcdvalue_collector::{ScraperSets, Sources};
use etcdvalue_core::{Config, ConfigError, CONFIG_CHECK_INTERVAL};
use etcdvalue_sources::{CacheStore, EtcdStore, HttpNodeAgent, RedisStore};

const DEFAULT_LOG_FILTER: &str = "info,etcdvalued=debug,etcdvalue=debug";

#[derive(Parser)]
#[command(name = "etcdvalued", version, about = "Prometheus exporter for values stored in etcd and redis")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "conf/etcdvalue_exporter.toml")]
    config: PathBuf,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = load_config(&cli.config).await?;
    info!(path = %cli.config.display(), scrapers = config.scrapers.len(), "config loaded");

    run(config).await
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

/// Wait for the config file to appear, then load it. Any other failure is fatal.
async fn load_config(path: &Path) -> anyhow::Result<Config> {
    loop {
        match Config::from_file(path) {
            Ok(config) => return Ok(config),
            Err(ConfigError::NotFound(missing)) => {
                warn!(
                    path = %missing.display(),
                    retry_in_secs = CONFIG_CHECK_INTERVAL.as_secs(),
                    "config file not found, waiting for it"
                );
                tokio::time::sleep(CONFIG_CHECK_INTERVAL).await;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("loading {}", path.display()));
            }
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    // ── Store clients ──────────────────────────────────────────

    let etcd = EtcdStore::connect(&config.etcd)
        .await
        .context("connecting to etcd")?;
    info!(endpoints = ?config.etcd.endpoints, "etcd client ready");

    let cache = config.redis.as_ref().map(|redis| {
        info!(address = %redis.address, db = redis.db, "redis client ready");
        Arc::new(RedisStore::new(redis)) as Arc<dyn CacheStore>
    });

    let sources = Sources {
        etcd: Arc::new(etcd),
        cache,
    };

    // ── Scraper sets ───────────────────────────────────────────

    let scrapers = ScraperSets::build(&config, &sources).context("building scrapers")?;

    let state = ApiState {
        scrapers: Arc::new(scrapers),
        node_agent: Arc::new(HttpNodeAgent::new(&config.node_agent)),
        node_tier: config.node_agent.tier.clone(),
        auth: Arc::new(config.auth.clone()),
        timeout: config.scrape_timeout(),
    };
    if !state.auth.enabled() {
        info!("basic auth disabled");
    }

    // ── HTTP server ────────────────────────────────────────────

    let addr: SocketAddr = config
        .address
        .parse()
        .with_context(|| format!("invalid listen address {:?}", config.address))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, timeout = ?state.timeout, "exporter listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("exporter stopped");
    Ok(())
}
