//! Scrape handlers.
//!
//! Each handler builds an exporter for the request, runs one collection pass
//! and answers with the text exposition.

use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use tracing::info;

use etcdvalue_collector::{node_scraper, render_exporter, Exporter, CONTENT_TYPE};

use crate::{ApiError, ApiState};

/// GET /
pub async fn landing(State(state): State<ApiState>) -> Html<String> {
    let mut links = String::new();
    for tier in state.scrapers.tiers() {
        let _ = writeln!(links, r#"<li><a href="/metrics/{tier}">/metrics/{tier}</a></li>"#);
    }
    let _ = writeln!(
        links,
        r#"<li><a href="/node-{0}">/node-{0}</a> (needs <code>node_ip</code> and <code>domain_id</code>)</li>"#,
        state.node_tier
    );

    Html(format!(
        "<html>\n<head><title>etcdvalue exporter</title></head>\n<body>\n\
         <h1>etcdvalue exporter</h1>\n<ul>\n{links}</ul>\n</body>\n</html>\n"
    ))
}

/// GET /metrics/{tier}
pub async fn tier_metrics(
    State(state): State<ApiState>,
    Path(tier): Path<String>,
) -> Result<Response, ApiError> {
    render_tier(&state, &tier).await
}

/// Run the static scrapers of `tier`. An unknown tier fails before any
/// scraper runs.
pub async fn render_tier(state: &ApiState, tier: &str) -> Result<Response, ApiError> {
    let exporter = state.scrapers.exporter(tier, state.timeout)?;
    exposition(&exporter).await
}

#[derive(Debug, Default, Deserialize)]
pub struct NodeQuery {
    pub node_ip: Option<String>,
    pub domain_id: Option<String>,
}

/// GET /node, GET /node-{node_tier}
pub async fn node_metrics(
    State(state): State<ApiState>,
    Query(query): Query<NodeQuery>,
) -> Result<Response, ApiError> {
    info!(
        node_ip = query.node_ip.as_deref().unwrap_or_default(),
        domain_id = query.domain_id.as_deref().unwrap_or_default(),
        "node scrape requested"
    );

    let scraper = node_scraper(
        query.node_ip.as_deref(),
        query.domain_id.as_deref(),
        Arc::clone(&state.node_agent),
    )?;
    let exporter = Exporter::new(state.node_tier.clone(), vec![scraper], state.timeout);
    exposition(&exporter).await
}

async fn exposition(exporter: &Exporter) -> Result<Response, ApiError> {
    let body = render_exporter(exporter).await?;
    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::http::StatusCode;
    use http_body_util::BodyExt;

    use etcdvalue_collector::{ScraperSets, Sources};
    use etcdvalue_core::{AuthConfig, Config};
    use etcdvalue_sources::{
        MemoryStore, NodeAgent, NodeStatus, NodeTarget, SourceError, SourceFuture,
    };

    #[derive(Debug)]
    struct DownAgent;

    impl NodeAgent for DownAgent {
        fn status<'a>(&'a self, _target: &'a NodeTarget) -> SourceFuture<'a, NodeStatus> {
            Box::pin(std::future::ready(Err(SourceError::Unavailable(
                "connection refused".into(),
            ))))
        }
    }

    fn state(store: &MemoryStore) -> ApiState {
        let config = Config::from_toml_str(
            r#"
[etcd]
endpoints = ["http://127.0.0.1:2379"]

[[scrapers]]
name = "values"
source = "etcd"
metric = "values"
keys = ["k1"]
"#,
        )
        .unwrap();
        let sources = Sources {
            etcd: Arc::new(store.clone()),
            cache: None,
        };
        ApiState {
            scrapers: Arc::new(ScraperSets::build(&config, &sources).unwrap()),
            node_agent: Arc::new(DownAgent),
            node_tier: "mr".into(),
            auth: Arc::new(AuthConfig::default()),
            timeout: Duration::from_secs(1),
        }
    }

    async fn body_text(resp: Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn tier_metrics_renders_values() {
        let store = MemoryStore::new();
        store.put("k1", "42");

        let resp = tier_metrics(State(state(&store)), Path("mr".into()))
            .await
            .unwrap();
        assert_eq!(resp.headers()[header::CONTENT_TYPE], CONTENT_TYPE);
        let body = body_text(resp).await;
        assert!(body.contains(r#"obj_values{key="k1"} 42"#), "{body}");
    }

    #[tokio::test]
    async fn unknown_tier_is_not_found() {
        let err = tier_metrics(State(state(&MemoryStore::new())), Path("zz".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_node_ip_is_bad_request() {
        let query = NodeQuery {
            node_ip: Some("10.0.0".into()),
            domain_id: Some("7".into()),
        };
        let err = node_metrics(State(state(&MemoryStore::new())), Query(query))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_node_params_still_answer() {
        let resp = node_metrics(State(state(&MemoryStore::new())), Query(NodeQuery::default()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_text(resp).await;
        assert!(
            body.contains(r#"obj_exporter_scrape_success{scraper="node_status",tier="mr"} 0"#),
            "{body}"
        );
    }

    #[tokio::test]
    async fn landing_lists_tiers() {
        let Html(page) = landing(State(state(&MemoryStore::new()))).await;
        assert!(page.contains("/metrics/mr"));
        assert!(page.contains("/node-mr"));
    }
}
