//! Coordination store (etcd) reads.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use etcd_client::{Client, ConnectOptions, GetOptions};
use tracing::debug;

use etcdvalue_core::EtcdConfig;

use crate::error::{SourceError, SourceResult};
use crate::SourceFuture;

/// A key and its raw stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
}

/// Read-only view of a coordination service.
///
/// A missing key is not an error: `get` returns an empty list.
pub trait CoordinationStore: Send + Sync + std::fmt::Debug {
    /// Read a single key.
    fn get<'a>(&'a self, key: &'a str) -> SourceFuture<'a, Vec<KeyValue>>;

    /// Read every key under `prefix`, in key order.
    fn get_prefix<'a>(&'a self, prefix: &'a str) -> SourceFuture<'a, Vec<KeyValue>>;
}

/// etcd v3 client. Cheap to clone; connections are shared by the underlying channel.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl std::fmt::Debug for EtcdStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdStore").finish_non_exhaustive()
    }
}

impl EtcdStore {
    /// Connect to the configured etcd cluster.
    pub async fn connect(config: &EtcdConfig) -> SourceResult<Self> {
        let mut options = ConnectOptions::new().with_connect_timeout(config.connect_timeout());
        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            options = options.with_user(user.clone(), password.clone());
        }

        let client = Client::connect(&config.endpoints, Some(options))
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        debug!(endpoints = ?config.endpoints, "etcd client connected");
        Ok(Self { client })
    }

    async fn range(&self, key: &str, options: Option<GetOptions>) -> SourceResult<Vec<KeyValue>> {
        let mut client = self.client.clone();
        let resp = client
            .get(key, options)
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        Ok(resp
            .kvs()
            .iter()
            .map(|kv| KeyValue {
                key: String::from_utf8_lossy(kv.key()).into_owned(),
                value: kv.value().to_vec(),
            })
            .collect())
    }
}

impl CoordinationStore for EtcdStore {
    fn get<'a>(&'a self, key: &'a str) -> SourceFuture<'a, Vec<KeyValue>> {
        Box::pin(self.range(key, None))
    }

    fn get_prefix<'a>(&'a self, prefix: &'a str) -> SourceFuture<'a, Vec<KeyValue>> {
        Box::pin(self.range(prefix, Some(GetOptions::new().with_prefix())))
    }
}

/// In-memory coordination store, for tests and local runs.
///
/// Can be switched into an unavailable state to simulate an unreachable cluster.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.data
            .write()
            .expect("memory store lock")
            .insert(key.to_string(), value.into());
    }

    pub fn delete(&self, key: &str) -> bool {
        self.data
            .write()
            .expect("memory store lock")
            .remove(key)
            .is_some()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn read(&self, matches: impl Fn(&str) -> bool) -> SourceResult<Vec<KeyValue>> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(SourceError::Unavailable("memory store marked unavailable".into()));
        }
        let data = self.data.read().expect("memory store lock");
        Ok(data
            .iter()
            .filter(|(k, _)| matches(k))
            .map(|(k, v)| KeyValue {
                key: k.clone(),
                value: v.clone(),
            })
            .collect())
    }
}

impl CoordinationStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> SourceFuture<'a, Vec<KeyValue>> {
        Box::pin(std::future::ready(self.read(|k| k == key)))
    }

    fn get_prefix<'a>(&'a self, prefix: &'a str) -> SourceFuture<'a, Vec<KeyValue>> {
        Box::pin(std::future::ready(self.read(|k| k.starts_with(prefix))))
    }
}
