//! Connection seam between the engine and a Redis server.
//!
//! [`StoreConnection`] is one client bound to one server, exposing exactly the
//! round trips the engine needs. Operations that read several independent
//! values go out as a single pipeline. [`ConnectionProvider`] opens a fresh
//! connection per request, so `SELECT` never leaks between requests.

use crate::config::BoardSettings;
use crate::error::{BoardError, BoardErrorKind, BoardResult};
use crate::types::{LengthQuery, ObjectBatch, ServerConfig, SlowlogEntry};
use async_trait::async_trait;
use std::time::Duration;

/// A live client for one server. Key names are raw bytes, as Redis stores
/// them; values come back as display text.
#[async_trait]
pub trait StoreConnection: Send {
    async fn select(&mut self, db: u32) -> BoardResult<()>;

    /// Raw TYPE reply.
    async fn key_type(&mut self, key: &[u8]) -> BoardResult<String>;

    /// OBJECT REFCOUNT, OBJECT ENCODING, OBJECT IDLETIME, the length query and
    /// TTL, pipelined.
    async fn object_batch(&mut self, key: &[u8], length: LengthQuery) -> BoardResult<ObjectBatch>;

    async fn dbsize(&mut self) -> BoardResult<u64>;

    /// DBSIZE followed by `count` RANDOMKEY calls, pipelined. Nil replies
    /// (empty database) are dropped; duplicates are kept.
    async fn dbsize_and_random_keys(&mut self, count: usize) -> BoardResult<(u64, Vec<Vec<u8>>)>;

    /// `count` RANDOMKEY calls, pipelined.
    async fn random_keys(&mut self, count: usize) -> BoardResult<Vec<Vec<u8>>>;

    /// Every key in the selected database.
    async fn keys(&mut self) -> BoardResult<Vec<Vec<u8>>>;

    /// DEBUG OBJECT and TTL for every key, pipelined. One `(reply, ttl)` per key.
    async fn debug_objects(&mut self, keys: &[Vec<u8>]) -> BoardResult<Vec<(String, i64)>>;

    async fn get(&mut self, key: &[u8]) -> BoardResult<Option<String>>;

    /// LRANGE with Redis' inclusive, negative-aware indexes.
    async fn lrange(&mut self, key: &[u8], start: i64, stop: i64) -> BoardResult<Vec<String>>;

    /// ZRANGE by rank, members only.
    async fn zrange(&mut self, key: &[u8], start: i64, stop: i64) -> BoardResult<Vec<String>>;

    async fn smembers(&mut self, key: &[u8]) -> BoardResult<Vec<String>>;

    async fn hgetall(&mut self, key: &[u8]) -> BoardResult<Vec<(String, String)>>;

    /// Number of keys removed.
    async fn del(&mut self, key: &[u8]) -> BoardResult<u64>;

    /// Full INFO text.
    async fn info(&mut self) -> BoardResult<String>;

    async fn slowlog_get(&mut self, count: usize) -> BoardResult<Vec<SlowlogEntry>>;

    async fn slowlog_len(&mut self) -> BoardResult<u64>;
}

/// Opens connections to one registered server.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn connect(&self) -> BoardResult<Box<dyn StoreConnection>>;
}

// ── Redis ───────────────────────────────────────────────────────────

/// Provider backed by a real Redis server.
pub struct RedisProvider {
    client: redis::Client,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl RedisProvider {
    pub fn new(config: &ServerConfig, settings: &BoardSettings) -> BoardResult<Self> {
        let client = redis::Client::open(config.connection_info()).map_err(|e| {
            BoardError::invalid_config(format!("Failed to create client: {e}"))
        })?;
        Ok(Self {
            client,
            connect_timeout: settings.connect_timeout(),
            response_timeout: settings.response_timeout(),
        })
    }
}

#[async_trait]
impl ConnectionProvider for RedisProvider {
    async fn connect(&self) -> BoardResult<Box<dyn StoreConnection>> {
        let config = redis::AsyncConnectionConfig::new()
            .set_connection_timeout(self.connect_timeout)
            .set_response_timeout(self.response_timeout);
        let con = self
            .client
            .get_multiplexed_async_connection_with_config(&config)
            .await
            .map_err(failed("connect"))?;
        Ok(Box::new(RedisConnection { con }))
    }
}

/// A dedicated multiplexed connection; never cloned, so SELECT stays local.
pub struct RedisConnection {
    con: redis::aio::MultiplexedConnection,
}

#[async_trait]
impl StoreConnection for RedisConnection {
    async fn select(&mut self, db: u32) -> BoardResult<()> {
        redis::cmd("SELECT")
            .arg(db)
            .query_async::<()>(&mut self.con)
            .await
            .map_err(failed("SELECT"))
    }

    async fn key_type(&mut self, key: &[u8]) -> BoardResult<String> {
        redis::cmd("TYPE")
            .arg(key)
            .query_async(&mut self.con)
            .await
            .map_err(failed("TYPE"))
    }

    async fn object_batch(&mut self, key: &[u8], length: LengthQuery) -> BoardResult<ObjectBatch> {
        let mut pipe = redis::pipe();
        pipe.cmd("OBJECT").arg("REFCOUNT").arg(key);
        pipe.cmd("OBJECT").arg("ENCODING").arg(key);
        pipe.cmd("OBJECT").arg("IDLETIME").arg(key);
        match length {
            LengthQuery::Llen => pipe.cmd("LLEN").arg(key),
            LengthQuery::Strlen => pipe.cmd("STRLEN").arg(key),
            LengthQuery::Scard => pipe.cmd("SCARD").arg(key),
            LengthQuery::Zcount => pipe.cmd("ZCOUNT").arg(key).arg("-inf").arg("+inf"),
            LengthQuery::Hlen => pipe.cmd("HLEN").arg(key),
        };
        pipe.cmd("TTL").arg(key);

        let (refcount, encoding, idletime, length, ttl): (i64, String, i64, u64, i64) = pipe
            .query_async(&mut self.con)
            .await
            .map_err(failed("OBJECT pipeline"))?;

        Ok(ObjectBatch {
            refcount,
            encoding,
            idletime,
            length,
            ttl,
        })
    }

    async fn dbsize(&mut self) -> BoardResult<u64> {
        redis::cmd("DBSIZE")
            .query_async(&mut self.con)
            .await
            .map_err(failed("DBSIZE"))
    }

    async fn dbsize_and_random_keys(&mut self, count: usize) -> BoardResult<(u64, Vec<Vec<u8>>)> {
        let mut pipe = redis::pipe();
        pipe.cmd("DBSIZE");
        for _ in 0..count {
            pipe.cmd("RANDOMKEY");
        }

        let replies: Vec<redis::Value> = pipe
            .query_async(&mut self.con)
            .await
            .map_err(failed("RANDOMKEY pipeline"))?;

        let (size, keys) = replies
            .split_first()
            .ok_or_else(|| BoardError::new(BoardErrorKind::TypeError, "Empty pipeline reply"))?;
        let size: u64 = redis::from_redis_value(size).map_err(failed("DBSIZE"))?;
        Ok((size, optional_keys(keys)?))
    }

    async fn random_keys(&mut self, count: usize) -> BoardResult<Vec<Vec<u8>>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for _ in 0..count {
            pipe.cmd("RANDOMKEY");
        }
        let replies: Vec<redis::Value> = pipe
            .query_async(&mut self.con)
            .await
            .map_err(failed("RANDOMKEY pipeline"))?;
        optional_keys(&replies)
    }

    async fn keys(&mut self) -> BoardResult<Vec<Vec<u8>>> {
        redis::cmd("KEYS")
            .arg("*")
            .query_async(&mut self.con)
            .await
            .map_err(failed("KEYS"))
    }

    async fn debug_objects(&mut self, keys: &[Vec<u8>]) -> BoardResult<Vec<(String, i64)>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("DEBUG").arg("OBJECT").arg(key);
            pipe.cmd("TTL").arg(key);
        }
        let replies: Vec<redis::Value> = pipe
            .query_async(&mut self.con)
            .await
            .map_err(failed("DEBUG OBJECT pipeline"))?;

        replies
            .chunks(2)
            .map(|pair| match pair {
                [debug, ttl] => Ok((
                    redis::from_redis_value::<String>(debug).map_err(failed("DEBUG OBJECT"))?,
                    redis::from_redis_value::<i64>(ttl).map_err(failed("TTL"))?,
                )),
                _ => Err(BoardError::new(
                    BoardErrorKind::TypeError,
                    "DEBUG OBJECT pipeline returned an odd number of replies",
                )),
            })
            .collect()
    }

    async fn get(&mut self, key: &[u8]) -> BoardResult<Option<String>> {
        let val: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.con)
            .await
            .map_err(failed("GET"))?;
        Ok(val.map(lossy))
    }

    async fn lrange(&mut self, key: &[u8], start: i64, stop: i64) -> BoardResult<Vec<String>> {
        let vals: Vec<Vec<u8>> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut self.con)
            .await
            .map_err(failed("LRANGE"))?;
        Ok(vals.into_iter().map(lossy).collect())
    }

    async fn zrange(&mut self, key: &[u8], start: i64, stop: i64) -> BoardResult<Vec<String>> {
        let vals: Vec<Vec<u8>> = redis::cmd("ZRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut self.con)
            .await
            .map_err(failed("ZRANGE"))?;
        Ok(vals.into_iter().map(lossy).collect())
    }

    async fn smembers(&mut self, key: &[u8]) -> BoardResult<Vec<String>> {
        let members: Vec<Vec<u8>> = redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut self.con)
            .await
            .map_err(failed("SMEMBERS"))?;
        Ok(members.into_iter().map(lossy).collect())
    }

    async fn hgetall(&mut self, key: &[u8]) -> BoardResult<Vec<(String, String)>> {
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut self.con)
            .await
            .map_err(failed("HGETALL"))?;
        Ok(pairs
            .into_iter()
            .map(|(field, value)| (lossy(field), lossy(value)))
            .collect())
    }

    async fn del(&mut self, key: &[u8]) -> BoardResult<u64> {
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut self.con)
            .await
            .map_err(failed("DEL"))
    }

    async fn info(&mut self) -> BoardResult<String> {
        redis::cmd("INFO")
            .query_async(&mut self.con)
            .await
            .map_err(failed("INFO"))
    }

    async fn slowlog_get(&mut self, count: usize) -> BoardResult<Vec<SlowlogEntry>> {
        // SLOWLOG GET returns nested arrays
        let raw: Vec<Vec<redis::Value>> = redis::cmd("SLOWLOG")
            .arg("GET")
            .arg(count)
            .query_async(&mut self.con)
            .await
            .map_err(failed("SLOWLOG GET"))?;

        Ok(raw.iter().filter_map(|entry| slowlog_entry(entry)).collect())
    }

    async fn slowlog_len(&mut self) -> BoardResult<u64> {
        redis::cmd("SLOWLOG")
            .arg("LEN")
            .query_async(&mut self.con)
            .await
            .map_err(failed("SLOWLOG LEN"))
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Convert a redis error, prefixing the message with the operation name.
fn failed(op: &'static str) -> impl FnOnce(redis::RedisError) -> BoardError {
    move |e| {
        let mut err = BoardError::from(e);
        err.message = format!("{op}: {}", err.message);
        err
    }
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

fn optional_keys(replies: &[redis::Value]) -> BoardResult<Vec<Vec<u8>>> {
    let mut keys = Vec::with_capacity(replies.len());
    for reply in replies {
        let key: Option<Vec<u8>> = redis::from_redis_value(reply).map_err(failed("RANDOMKEY"))?;
        keys.extend(key);
    }
    Ok(keys)
}

fn slowlog_entry(entry: &[redis::Value]) -> Option<SlowlogEntry> {
    if entry.len() < 4 {
        return None;
    }
    Some(SlowlogEntry {
        id: redis_value_to_i64(&entry[0]),
        timestamp: redis_value_to_i64(&entry[1]),
        duration_us: redis_value_to_i64(&entry[2]),
        command: redis_value_to_strings(&entry[3]),
        client_addr: entry.get(4).and_then(redis_value_to_string),
        client_name: entry.get(5).and_then(redis_value_to_string),
    })
}

fn redis_value_to_i64(val: &redis::Value) -> i64 {
    match val {
        redis::Value::Int(i) => *i,
        redis::Value::BulkString(data) => String::from_utf8_lossy(data).parse().unwrap_or(0),
        _ => 0,
    }
}

fn redis_value_to_string(val: &redis::Value) -> Option<String> {
    match val {
        redis::Value::BulkString(data) => Some(String::from_utf8_lossy(data).to_string()),
        redis::Value::SimpleString(s) => Some(s.clone()),
        redis::Value::Int(i) => Some(i.to_string()),
        redis::Value::Nil => None,
        _ => Some(format!("{val:?}")),
    }
}

fn redis_value_to_strings(val: &redis::Value) -> Vec<String> {
    match val {
        redis::Value::Array(arr) => arr.iter().filter_map(redis_value_to_string).collect(),
        _ => vec![],
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> redis::Value {
        redis::Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_slowlog_entry_full() {
        let entry = vec![
            redis::Value::Int(7),
            redis::Value::Int(1_700_000_000),
            redis::Value::Int(15_300),
            redis::Value::Array(vec![bulk("KEYS"), bulk("*")]),
            bulk("127.0.0.1:50000"),
            bulk(""),
        ];
        let parsed = slowlog_entry(&entry).unwrap();
        assert_eq!(parsed.id, 7);
        assert_eq!(parsed.duration_us, 15_300);
        assert_eq!(parsed.command, vec!["KEYS", "*"]);
        assert_eq!(parsed.client_addr.as_deref(), Some("127.0.0.1:50000"));
    }

    #[test]
    fn test_slowlog_entry_too_short() {
        assert!(slowlog_entry(&[redis::Value::Int(1)]).is_none());
    }

    #[test]
    fn test_optional_keys_drops_nil() {
        let keys = optional_keys(&[bulk("a"), redis::Value::Nil, bulk("a")]).unwrap();
        assert_eq!(keys, vec![b"a".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn test_optional_keys_keeps_binary_names() {
        let raw = redis::Value::BulkString(vec![0xff, 0x00, b'k']);
        let keys = optional_keys(&[raw]).unwrap();
        assert_eq!(keys, vec![vec![0xff, 0x00, b'k']]);
    }

    #[test]
    fn test_provider_accepts_reserved_password_characters() {
        let mut config = ServerConfig::new(1, "localhost", 6379);
        config.password = Some("a/b#c?d%41".into());
        assert!(RedisProvider::new(&config, &BoardSettings::default()).is_ok());
    }

    #[test]
    fn test_redis_value_to_i64() {
        assert_eq!(redis_value_to_i64(&redis::Value::Int(99)), 99);
        assert_eq!(redis_value_to_i64(&bulk("42")), 42);
        assert_eq!(redis_value_to_i64(&redis::Value::Nil), 0);
    }

    #[test]
    fn test_failed_prefixes_operation() {
        let err = failed("LRANGE")(redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "Response was of incompatible type",
        )));
        assert!(err.message.starts_with("LRANGE: "));
        assert_eq!(err.kind, BoardErrorKind::TypeError);
    }
}
