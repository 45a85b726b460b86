//! Live status reads from a node's own reporting agent.
//!
//! The agent answers `GET {path}?domain_id={id}` on `{node_ip}:{port}` with a
//! flat JSON object of status items, e.g. `{"disk_used_bytes": 1024, "online": true}`.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use http_body_util::BodyExt;
use thiserror::Error;
use tracing::debug;

use etcdvalue_core::NodeAgentConfig;

use crate::error::{SourceError, SourceResult};
use crate::SourceFuture;

/// Status items reported by a node agent, keyed by item name.
pub type NodeStatus = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("invalid node_ip {0:?}")]
    InvalidNodeIp(String),

    #[error("invalid domain_id {0:?}")]
    InvalidDomainId(String),
}

/// The node and domain a node-scoped scrape queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTarget {
    pub node_ip: IpAddr,
    pub domain_id: String,
}

impl NodeTarget {
    /// Validate raw request parameters.
    ///
    /// Domain ids are restricted to `[A-Za-z0-9_.-]` so they can be placed in
    /// a query string verbatim.
    pub fn parse(node_ip: &str, domain_id: &str) -> Result<Self, TargetError> {
        let node_ip = node_ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| TargetError::InvalidNodeIp(node_ip.to_string()))?;

        let valid_domain = !domain_id.is_empty()
            && domain_id.len() <= 64
            && domain_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if !valid_domain {
            return Err(TargetError::InvalidDomainId(domain_id.to_string()));
        }

        Ok(Self {
            node_ip,
            domain_id: domain_id.to_string(),
        })
    }
}

impl fmt::Display for NodeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node_ip, self.domain_id)
    }
}

/// Something that can report a node's live status.
pub trait NodeAgent: Send + Sync + fmt::Debug {
    fn status<'a>(&'a self, target: &'a NodeTarget) -> SourceFuture<'a, NodeStatus>;
}

/// Queries the reporting agent over plain HTTP/1.1.
#[derive(Debug, Clone)]
pub struct HttpNodeAgent {
    port: u16,
    path: String,
    timeout: Duration,
}

impl HttpNodeAgent {
    pub fn new(config: &NodeAgentConfig) -> Self {
        Self {
            port: config.port,
            path: config.path.clone(),
            timeout: config.timeout(),
        }
    }

    async fn fetch(&self, target: &NodeTarget) -> SourceResult<NodeStatus> {
        let address = SocketAddr::new(target.node_ip, self.port);
        let path = format!("{}?domain_id={}", self.path, target.domain_id);

        let stream = tokio::net::TcpStream::connect(address)
            .await
            .map_err(|e| SourceError::Unavailable(format!("{address}: {e}")))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| SourceError::Unavailable(format!("{address}: handshake: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&path)
            .header("host", address.to_string())
            .header("accept", "application/json")
            .header("user-agent", "etcdvalue-exporter/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| SourceError::Protocol(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| SourceError::Unavailable(format!("{address}: {e}")))?;
        if !resp.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "{address}: agent returned {}",
                resp.status()
            )));
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| SourceError::Unavailable(format!("{address}: {e}")))?
            .to_bytes();

        match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(serde_json::Value::Object(status)) => Ok(status),
            Ok(other) => Err(SourceError::MalformedReply(format!(
                "expected a JSON object, got {other}"
            ))),
            Err(e) => Err(SourceError::MalformedReply(format!("invalid JSON: {e}"))),
        }
    }
}

impl NodeAgent for HttpNodeAgent {
    fn status<'a>(&'a self, target: &'a NodeTarget) -> SourceFuture<'a, NodeStatus> {
        Box::pin(async move {
            let status = tokio::time::timeout(self.timeout, self.fetch(target))
                .await
                .map_err(|_| SourceError::Timeout(self.timeout))??;
            debug!(%target, items = status.len(), "node agent status fetched");
            Ok(status)
        })
    }
}
