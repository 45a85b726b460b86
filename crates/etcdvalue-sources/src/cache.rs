//! Cache store (redis) reads.
//!
//! Speaks just enough RESP to authenticate, select a database, and issue
//! `MGET`. Each read opens its own connection; the exporter scrapes rarely
//! enough that pooling buys nothing.
//!
//! ```text
//! Client → Server:
//!   *3\r\n$4\r\nMGET\r\n$2\r\nk1\r\n$2\r\nk2\r\n
//!
//! Server → Client:
//!   *2\r\n$2\r\n42\r\n$-1\r\n      (k2 does not exist)
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use etcdvalue_core::RedisConfig;

use crate::error::{SourceError, SourceResult};
use crate::SourceFuture;

/// Largest bulk string accepted from the server. Exported values are
/// numbers, so anything near this size is already a broken reply.
const MAX_BULK_LEN: usize = 1024 * 1024;

/// Read-only view of a cache.
pub trait CacheStore: Send + Sync + std::fmt::Debug {
    /// Fetch several keys at once. The result has one entry per key, `None`
    /// for keys that do not exist.
    fn mget<'a>(&'a self, keys: &'a [String]) -> SourceFuture<'a, Vec<Option<Vec<u8>>>>;
}

/// One RESP reply. Arrays may only contain scalar replies.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Reply>>),
}

#[derive(Debug, Clone)]
pub struct RedisStore {
    address: String,
    password: Option<String>,
    db: u32,
    timeout: Duration,
}

impl RedisStore {
    pub fn new(config: &RedisConfig) -> Self {
        Self {
            address: config.address.clone(),
            password: config.password.clone(),
            db: config.db,
            timeout: config.timeout(),
        }
    }

    async fn mget_inner(&self, keys: &[String]) -> SourceResult<Vec<Option<Vec<u8>>>> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", self.address)))?;
        let mut conn = BufReader::new(stream);

        if let Some(password) = &self.password {
            command(&mut conn, &["AUTH", password.as_str()]).await?;
            expect_ok(read_reply(&mut conn, 0).await?)?;
        }
        if self.db != 0 {
            let db = self.db.to_string();
            command(&mut conn, &["SELECT", db.as_str()]).await?;
            expect_ok(read_reply(&mut conn, 0).await?)?;
        }

        let mut args = Vec::with_capacity(keys.len() + 1);
        args.push("MGET");
        args.extend(keys.iter().map(String::as_str));
        command(&mut conn, &args).await?;

        let values = match read_reply(&mut conn, keys.len()).await? {
            Reply::Array(Some(items)) => items,
            Reply::Error(msg) => return Err(SourceError::Protocol(msg)),
            other => {
                return Err(SourceError::Protocol(format!(
                    "unexpected MGET reply: {other:?}"
                )));
            }
        };
        if values.len() != keys.len() {
            return Err(SourceError::Protocol(format!(
                "MGET returned {} values for {} keys",
                values.len(),
                keys.len()
            )));
        }

        values
            .into_iter()
            .map(|reply| match reply {
                Reply::Bulk(value) => Ok(value),
                other => Err(SourceError::Protocol(format!(
                    "unexpected MGET element: {other:?}"
                ))),
            })
            .collect()
    }
}

impl CacheStore for RedisStore {
    fn mget<'a>(&'a self, keys: &'a [String]) -> SourceFuture<'a, Vec<Option<Vec<u8>>>> {
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(Vec::new());
            }
            let values = tokio::time::timeout(self.timeout, self.mget_inner(keys))
                .await
                .map_err(|_| SourceError::Timeout(self.timeout))??;
            debug!(address = %self.address, keys = keys.len(), "redis MGET complete");
            Ok(values)
        })
    }
}

/// Write one command as a RESP array of bulk strings.
async fn command(conn: &mut BufReader<TcpStream>, args: &[&str]) -> SourceResult<()> {
    conn.get_mut()
        .write_all(&encode_command(args))
        .await
        .map_err(|e| SourceError::Unavailable(e.to_string()))
}

fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut buf = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

fn expect_ok(reply: Reply) -> SourceResult<()> {
    match reply {
        Reply::Simple(_) => Ok(()),
        Reply::Error(msg) => Err(SourceError::Protocol(msg)),
        other => Err(SourceError::Protocol(format!("unexpected reply: {other:?}"))),
    }
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> SourceResult<String> {
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .await
        .map_err(|e| SourceError::Unavailable(e.to_string()))?;
    if n == 0 {
        return Err(SourceError::Unavailable("connection closed".into()));
    }
    match line.strip_suffix("\r\n") {
        Some(stripped) => Ok(stripped.to_string()),
        None => Err(SourceError::Protocol(format!("unterminated line: {line:?}"))),
    }
}

fn parse_len(s: &str) -> SourceResult<i64> {
    s.parse()
        .map_err(|_| SourceError::Protocol(format!("invalid length: {s:?}")))
}

/// Convert a server-supplied length, rejecting anything above `max`.
fn bounded_len(len: i64, max: usize, what: &str) -> SourceResult<usize> {
    match usize::try_from(len) {
        Ok(len) if len <= max => Ok(len),
        _ => Err(SourceError::Protocol(format!(
            "{what} length {len} exceeds limit of {max}"
        ))),
    }
}

async fn read_scalar<R: AsyncBufRead + Unpin>(reader: &mut R, line: &str) -> SourceResult<Reply> {
    let mut chars = line.chars();
    let tag = chars.next();
    let rest = chars.as_str();
    match tag {
        Some('+') => Ok(Reply::Simple(rest.to_string())),
        Some('-') => Ok(Reply::Error(rest.to_string())),
        Some(':') => Ok(Reply::Integer(parse_len(rest)?)),
        Some('$') => {
            let len = parse_len(rest)?;
            if len < 0 {
                return Ok(Reply::Bulk(None));
            }
            let len = bounded_len(len, MAX_BULK_LEN, "bulk string")?;
            let mut buf = vec![0u8; len + 2];
            reader
                .read_exact(&mut buf)
                .await
                .map_err(|e| SourceError::Unavailable(e.to_string()))?;
            if !buf.ends_with(b"\r\n") {
                return Err(SourceError::Protocol("bulk string missing CRLF".into()));
            }
            buf.truncate(len);
            Ok(Reply::Bulk(Some(buf)))
        }
        _ => Err(SourceError::Protocol(format!("unexpected reply line: {line:?}"))),
    }
}

/// Read one reply. Arrays longer than `max_items` are rejected before any
/// element is read.
async fn read_reply<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    max_items: usize,
) -> SourceResult<Reply> {
    let line = read_line(reader).await?;
    let Some(count) = line.strip_prefix('*') else {
        return read_scalar(reader, &line).await;
    };

    let count = parse_len(count)?;
    if count < 0 {
        return Ok(Reply::Array(None));
    }
    let count = bounded_len(count, max_items, "array")?;
    let mut items = Vec::new();
    for _ in 0..count {
        let line = read_line(reader).await?;
        if line.starts_with('*') {
            return Err(SourceError::Protocol("nested arrays are not supported".into()));
        }
        items.push(read_scalar(reader, &line).await?);
    }
    Ok(Reply::Array(Some(items)))
}

/// In-memory cache, for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.data
            .write()
            .expect("memory cache lock")
            .insert(key.to_string(), value.into());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn read(&self, keys: &[String]) -> SourceResult<Vec<Option<Vec<u8>>>> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(SourceError::Unavailable("memory cache marked unavailable".into()));
        }
        let data = self.data.read().expect("memory cache lock");
        Ok(keys.iter().map(|k| data.get(k).cloned()).collect())
    }
}

impl CacheStore for MemoryCache {
    fn mget<'a>(&'a self, keys: &'a [String]) -> SourceFuture<'a, Vec<Option<Vec<u8>>>> {
        Box::pin(std::future::ready(self.read(keys)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_mget() {
        let buf = encode_command(&["MGET", "k1", "k2"]);
        assert_eq!(buf, b"*3\r\n$4\r\nMGET\r\n$2\r\nk1\r\n$2\r\nk2\r\n".to_vec());
    }

    #[tokio::test]
    async fn parse_mget_reply_with_nil() {
        let mut input: &[u8] = b"*2\r\n$2\r\n42\r\n$-1\r\n";
        let reply = read_reply(&mut input, 2).await.unwrap();
        assert_eq!(
            reply,
            Reply::Array(Some(vec![Reply::Bulk(Some(b"42".to_vec())), Reply::Bulk(None)]))
        );
    }

    #[tokio::test]
    async fn parse_simple_and_error() {
        let mut input: &[u8] = b"+OK\r\n-ERR invalid password\r\n:7\r\n";
        assert_eq!(read_reply(&mut input, 2).await.unwrap(), Reply::Simple("OK".into()));
        assert_eq!(
            read_reply(&mut input, 2).await.unwrap(),
            Reply::Error("ERR invalid password".into())
        );
        assert_eq!(read_reply(&mut input, 2).await.unwrap(), Reply::Integer(7));
    }

    #[tokio::test]
    async fn parse_truncated_reply_fails() {
        let mut input: &[u8] = b"*2\r\n$2\r\n42\r\n";
        assert!(matches!(
            read_reply(&mut input, 2).await,
            Err(SourceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn parse_rejects_nested_array() {
        let mut input: &[u8] = b"*1\r\n*0\r\n";
        assert!(matches!(
            read_reply(&mut input, 2).await,
            Err(SourceError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn parse_rejects_oversized_bulk_length() {
        let mut input: &[u8] = b"$35184372088832\r\n";
        assert!(matches!(
            read_reply(&mut input, 2).await,
            Err(SourceError::Protocol(_))
        ));

        let mut input: &[u8] = b"$9223372036854775807\r\n";
        assert!(matches!(
            read_reply(&mut input, 2).await,
            Err(SourceError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn parse_rejects_array_longer_than_requested() {
        let mut input: &[u8] = b"*9223372036854775807\r\n";
        assert!(matches!(
            read_reply(&mut input, 2).await,
            Err(SourceError::Protocol(_))
        ));

        let mut input: &[u8] = b"*3\r\n:1\r\n:2\r\n:3\r\n";
        assert!(matches!(
            read_reply(&mut input, 2).await,
            Err(SourceError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn redis_oversized_reply_fails_the_read_only() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let _server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(b"*1\r\n$35184372088832\r\n").await.unwrap();
        });

        let store = RedisStore::new(&RedisConfig {
            address,
            password: None,
            db: 0,
            timeout: "2s".into(),
        });
        let keys = vec!["a".to_string()];
        assert!(matches!(
            store.mget(&keys).await,
            Err(SourceError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn redis_mget_against_fake_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"*2\r\n$4\r\n12.5\r\n$-1\r\n")
                .await
                .unwrap();
            buf.truncate(n);
            buf
        });

        let store = RedisStore::new(&RedisConfig {
            address,
            password: None,
            db: 0,
            timeout: "2s".into(),
        });
        let keys = vec!["a".to_string(), "b".to_string()];
        let values = store.mget(&keys).await.unwrap();
        assert_eq!(values, vec![Some(b"12.5".to_vec()), None]);

        let request = server.await.unwrap();
        assert_eq!(request, encode_command(&["MGET", "a", "b"]));
    }

    #[tokio::test]
    async fn redis_unreachable_is_unavailable() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let store = RedisStore::new(&RedisConfig {
            address,
            password: None,
            db: 0,
            timeout: "2s".into(),
        });
        let keys = vec!["a".to_string()];
        assert!(matches!(
            store.mget(&keys).await,
            Err(SourceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn memory_cache_mget() {
        let cache = MemoryCache::new();
        cache.set("a", "1");
        let keys = vec!["a".to_string(), "missing".to_string()];
        assert_eq!(cache.mget(&keys).await.unwrap(), vec![Some(b"1".to_vec()), None]);

        cache.set_unavailable(true);
        assert!(cache.mget(&keys).await.is_err());
    }
}
