//! etcdvalue-api — HTTP surface of the etcdvalue exporter.
//!
//! Every scrape request builds a fresh exporter and a fresh registry, so
//! concurrent requests never share collection state.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Landing page |
//! | GET | `/metrics/{tier}` | Static scrapers of one tier |
//! | GET | `/metrics-{tier}` | Same, one alias per configured tier |
//! | GET | `/node` | Live status of `?node_ip=..&domain_id=..` |
//! | GET | `/node-{node_tier}` | Same, under the node tier's name |
//!
//! All routes sit behind HTTP basic auth when credentials are configured.

pub mod auth;
pub mod error;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::middleware;
use axum::routing::get;
use axum::Router;

use etcdvalue_collector::ScraperSets;
use etcdvalue_core::AuthConfig;
use etcdvalue_sources::NodeAgent;

pub use error::ApiError;

/// Shared state for the handlers. Everything in here is read-only.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub scrapers: Arc<ScraperSets>,
    pub node_agent: Arc<dyn NodeAgent>,
    /// Tier name node-scoped exporters report under.
    pub node_tier: String,
    pub auth: Arc<AuthConfig>,
    /// Upper bound for each scraper within one pass.
    pub timeout: Duration,
}

/// Build the complete router.
pub fn build_router(state: ApiState) -> Router {
    let mut router = Router::new()
        .route("/", get(handlers::landing))
        .route("/metrics/{tier}", get(handlers::tier_metrics))
        .route("/node", get(handlers::node_metrics))
        .route(&format!("/node-{}", state.node_tier), get(handlers::node_metrics));

    for tier in state.scrapers.tiers() {
        let tier = tier.to_string();
        router = router.route(
            &format!("/metrics-{tier}"),
            get(move |State(state): State<ApiState>| async move {
                handlers::render_tier(&state, &tier).await
            }),
        );
    }

    router
        .layer(middleware::from_fn_with_state(state.clone(), auth::basic_auth))
        .with_state(state)
}
