//! etcdvalue-sources — the stores the exporter reads from.
//!
//! Every source is exposed through a small read-only trait so scrapers can be
//! exercised against in-memory fakes:
//!
//! ```text
//! CoordinationStore  ── EtcdStore (etcd v3 gRPC), MemoryStore
//! CacheStore         ── RedisStore (RESP over TCP), MemoryCache
//! NodeAgent          ── HttpNodeAgent (per-node reporting endpoint)
//! ```
//!
//! Reads either return a complete value (possibly empty) or a [`SourceError`];
//! callers never observe a partially read reply.

pub mod cache;
pub mod coordination;
pub mod error;
pub mod node;

use std::future::Future;
use std::pin::Pin;

pub use cache::{CacheStore, MemoryCache, RedisStore};
pub use coordination::{CoordinationStore, EtcdStore, KeyValue, MemoryStore};
pub use error::{SourceError, SourceResult};
pub use node::{HttpNodeAgent, NodeAgent, NodeStatus, NodeTarget, TargetError};

/// Boxed future returned by every source read.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = SourceResult<T>> + Send + 'a>>;
