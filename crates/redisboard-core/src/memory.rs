//! In-memory store implementing the connection traits.
//!
//! Behaves like a single Redis server with sixteen databases, closely enough
//! for the engine: typed values, TTLs, WRONGTYPE replies, INFO and DEBUG
//! OBJECT text. RANDOMKEY walks the keys round-robin so sampling is
//! deterministic. Failures can be injected per command name, and the whole
//! server can be taken down.

use crate::connection::{ConnectionProvider, StoreConnection};
use crate::error::{BoardError, BoardErrorKind, BoardResult};
use crate::types::{LengthQuery, ObjectBatch, SlowlogEntry};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Number of logical databases.
pub const DATABASES: u32 = 16;

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// A stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryValue {
    String(String),
    List(Vec<String>),
    Set(BTreeSet<String>),
    /// Members ordered by score.
    ZSet(Vec<(String, f64)>),
    /// Fields in insertion order.
    Hash(Vec<(String, String)>),
}

impl MemoryValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::ZSet(_) => "zset",
            Self::Hash(_) => "hash",
        }
    }

    pub fn encoding(&self) -> &'static str {
        match self {
            Self::String(s) if s.parse::<i64>().is_ok() => "int",
            Self::String(s) if s.len() <= 44 => "embstr",
            Self::String(_) => "raw",
            Self::List(_) => "quicklist",
            Self::Set(_) | Self::ZSet(_) | Self::Hash(_) => "listpack",
        }
    }

    pub fn length(&self) -> u64 {
        let len = match self {
            Self::String(s) => s.len(),
            Self::List(items) => items.len(),
            Self::Set(members) => members.len(),
            Self::ZSet(members) => members.len(),
            Self::Hash(fields) => fields.len(),
        };
        len as u64
    }

    /// Payload bytes, reported by DEBUG OBJECT as `serializedlength`.
    pub fn serialized_length(&self) -> u64 {
        let bytes: usize = match self {
            Self::String(s) => s.len(),
            Self::List(items) => items.iter().map(String::len).sum(),
            Self::Set(members) => members.iter().map(String::len).sum(),
            Self::ZSet(members) => members.iter().map(|(m, _)| m.len() + 8).sum(),
            Self::Hash(fields) => fields.iter().map(|(f, v)| f.len() + v.len()).sum(),
        };
        bytes as u64
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: MemoryValue,
    ttl: Option<i64>,
}

/// One LRANGE or ZRANGE call as the store received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeCall {
    pub command: &'static str,
    pub key: Vec<u8>,
    pub start: i64,
    pub stop: i64,
}

#[derive(Debug, Default)]
struct State {
    dbs: BTreeMap<u32, BTreeMap<Vec<u8>, Entry>>,
    down: bool,
    failing: HashSet<String>,
    reported_types: HashMap<Vec<u8>, String>,
    slowlog: Vec<SlowlogEntry>,
    range_calls: Vec<RangeCall>,
    random_cursor: usize,
    connects: usize,
}

impl State {
    fn check(&self, command: &str) -> BoardResult<()> {
        if self.down {
            return Err(BoardError::connection_failed(
                "Connection refused (os error 111)",
            ));
        }
        if self.failing.contains(command) {
            return Err(BoardError::command(format!("ERR injected failure for {command}")));
        }
        Ok(())
    }

    fn entry(&self, db: u32, key: &[u8]) -> Option<&Entry> {
        self.dbs.get(&db).and_then(|keys| keys.get(key))
    }

    fn sorted_keys(&self, db: u32) -> Vec<Vec<u8>> {
        self.dbs
            .get(&db)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn random_keys(&mut self, db: u32, count: usize) -> Vec<Vec<u8>> {
        let keys = self.sorted_keys(db);
        if keys.is_empty() {
            return Vec::new();
        }
        let mut drawn = Vec::with_capacity(count);
        for _ in 0..count {
            drawn.push(keys[self.random_cursor % keys.len()].clone());
            self.random_cursor += 1;
        }
        drawn
    }

    fn render_info(&self) -> String {
        let keyspace: Vec<String> = self
            .dbs
            .iter()
            .filter(|(_, keys)| !keys.is_empty())
            .map(|(db, keys)| {
                let expires = keys.values().filter(|e| e.ttl.is_some()).count();
                format!("db{db}:keys={},expires={expires},avg_ttl=0", keys.len())
            })
            .collect();

        let sections: [(&str, Vec<(&str, String)>); 6] = [
            (
                "Server",
                vec![
                    ("redis_version", "7.2.4".into()),
                    ("redis_mode", "standalone".into()),
                    ("multiplexing_api", "epoll".into()),
                    ("uptime_in_seconds", "1000".into()),
                    ("uptime_in_days", "0".into()),
                ],
            ),
            ("Clients", vec![("connected_clients", "1".into())]),
            (
                "Memory",
                vec![
                    ("used_memory", "1048576".into()),
                    ("used_memory_human", "1.00M".into()),
                    ("used_memory_peak", "2097152".into()),
                    ("used_memory_peak_human", "2.00M".into()),
                ],
            ),
            (
                "Persistence",
                vec![
                    ("aof_enabled", "0".into()),
                    ("rdb_changes_since_last_save", "0".into()),
                ],
            ),
            (
                "Stats",
                vec![
                    ("total_connections_received", self.connects.to_string()),
                    ("total_commands_processed", "42".into()),
                ],
            ),
            (
                "CPU",
                vec![
                    ("used_cpu_sys", "1.500000".into()),
                    ("used_cpu_user", "2.000000".into()),
                    ("used_cpu_sys_children", "0.250000".into()),
                    ("used_cpu_user_children", "0.250000".into()),
                ],
            ),
        ];

        let mut out = String::new();
        for (title, fields) in sections {
            out.push_str(&format!("# {title}\r\n"));
            for (name, value) in fields {
                out.push_str(&format!("{name}:{value}\r\n"));
            }
            out.push_str("\r\n");
        }
        out.push_str("# Keyspace\r\n");
        for line in keyspace {
            out.push_str(&line);
            out.push_str("\r\n");
        }
        out
    }
}

/// Shared handle to an in-memory server. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` under `key`, which may be any byte string.
    pub fn insert(&self, db: u32, key: impl AsRef<[u8]>, value: MemoryValue) -> &Self {
        self.state()
            .dbs
            .entry(db)
            .or_default()
            .insert(key.as_ref().to_vec(), Entry { value, ttl: None });
        self
    }

    pub fn set_string(&self, db: u32, key: &str, value: &str) -> &Self {
        self.insert(db, key, MemoryValue::String(value.to_string()))
    }

    pub fn rpush(&self, db: u32, key: &str, items: &[&str]) -> &Self {
        let items = items.iter().map(|s| s.to_string()).collect();
        self.insert(db, key, MemoryValue::List(items))
    }

    pub fn sadd(&self, db: u32, key: &str, members: &[&str]) -> &Self {
        let members = members.iter().map(|s| s.to_string()).collect();
        self.insert(db, key, MemoryValue::Set(members))
    }

    pub fn zadd(&self, db: u32, key: &str, members: &[(&str, f64)]) -> &Self {
        let mut members: Vec<(String, f64)> =
            members.iter().map(|(m, s)| (m.to_string(), *s)).collect();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        self.insert(db, key, MemoryValue::ZSet(members))
    }

    pub fn hset(&self, db: u32, key: &str, fields: &[(&str, &str)]) -> &Self {
        let fields = fields
            .iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect();
        self.insert(db, key, MemoryValue::Hash(fields))
    }

    /// Give an existing key a TTL in seconds.
    pub fn expire(&self, db: u32, key: impl AsRef<[u8]>, seconds: i64) -> &Self {
        if let Some(entry) = self
            .state()
            .dbs
            .get_mut(&db)
            .and_then(|keys| keys.get_mut(key.as_ref()))
        {
            entry.ttl = Some(seconds);
        }
        self
    }

    /// Refuse every connection and command while set.
    pub fn set_down(&self, down: bool) -> &Self {
        self.state().down = down;
        self
    }

    /// Make a command (by upper-case name) reply with an error.
    pub fn fail_command(&self, command: &str) -> &Self {
        self.state().failing.insert(command.to_uppercase());
        self
    }

    /// Make TYPE report `type_name` for `key` regardless of what is stored,
    /// as if the key changed type between two round trips.
    pub fn report_type(&self, key: &str, type_name: &str) -> &Self {
        self.state()
            .reported_types
            .insert(key.as_bytes().to_vec(), type_name.to_string());
        self
    }

    pub fn push_slowlog(&self, entry: SlowlogEntry) -> &Self {
        self.state().slowlog.push(entry);
        self
    }

    pub fn exists(&self, db: u32, key: impl AsRef<[u8]>) -> bool {
        self.state().entry(db, key.as_ref()).is_some()
    }

    pub fn key_count(&self, db: u32) -> u64 {
        self.state().dbs.get(&db).map_or(0, |keys| keys.len() as u64)
    }

    pub fn range_calls(&self) -> Vec<RangeCall> {
        self.state().range_calls.clone()
    }

    /// Number of connections opened so far.
    pub fn connects(&self) -> usize {
        self.state().connects
    }
}

#[async_trait]
impl ConnectionProvider for MemoryStore {
    async fn connect(&self) -> BoardResult<Box<dyn StoreConnection>> {
        {
            let mut state = self.state();
            state.check("CONNECT")?;
            state.connects += 1;
        }
        Ok(Box::new(MemoryConnection {
            store: self.clone(),
            db: 0,
        }))
    }
}

/// A connection to a [`MemoryStore`], with its own selected database.
#[derive(Debug)]
pub struct MemoryConnection {
    store: MemoryStore,
    db: u32,
}

impl MemoryConnection {
    fn range(&self, command: &'static str, key: &[u8], start: i64, stop: i64) -> BoardResult<Vec<String>> {
        let mut state = self.store.state();
        state.check(command)?;
        state.range_calls.push(RangeCall {
            command,
            key: key.to_vec(),
            start,
            stop,
        });
        let items: Vec<String> = match state.entry(self.db, key).map(|e| &e.value) {
            None => return Ok(Vec::new()),
            Some(MemoryValue::List(items)) if command == "LRANGE" => items.clone(),
            Some(MemoryValue::ZSet(members)) if command == "ZRANGE" => {
                members.iter().map(|(m, _)| m.clone()).collect()
            }
            Some(_) => return Err(wrong_type()),
        };
        Ok(redis_range(&items, start, stop))
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn select(&mut self, db: u32) -> BoardResult<()> {
        self.store.state().check("SELECT")?;
        if db >= DATABASES {
            return Err(BoardError::command("ERR DB index is out of range"));
        }
        self.db = db;
        Ok(())
    }

    async fn key_type(&mut self, key: &[u8]) -> BoardResult<String> {
        let state = self.store.state();
        state.check("TYPE")?;
        if let Some(reported) = state.reported_types.get(key) {
            return Ok(reported.clone());
        }
        Ok(state
            .entry(self.db, key)
            .map_or("none", |e| e.value.type_name())
            .to_string())
    }

    async fn object_batch(&mut self, key: &[u8], length: LengthQuery) -> BoardResult<ObjectBatch> {
        let state = self.store.state();
        state.check("OBJECT")?;
        state.check(length_command(length))?;
        state.check("TTL")?;
        let entry = state.entry(self.db, key).ok_or_else(|| {
            BoardError::new(
                BoardErrorKind::TypeError,
                "Response was of incompatible type: \"Response type not integer compatible.\" (response was nil)",
            )
        })?;
        let matches = matches!(
            (length, &entry.value),
            (LengthQuery::Strlen, MemoryValue::String(_))
                | (LengthQuery::Llen, MemoryValue::List(_))
                | (LengthQuery::Scard, MemoryValue::Set(_))
                | (LengthQuery::Zcount, MemoryValue::ZSet(_))
                | (LengthQuery::Hlen, MemoryValue::Hash(_))
        );
        if !matches {
            return Err(wrong_type());
        }
        Ok(ObjectBatch {
            refcount: 1,
            encoding: entry.value.encoding().to_string(),
            idletime: 0,
            length: entry.value.length(),
            ttl: entry.ttl.unwrap_or(-1),
        })
    }

    async fn dbsize(&mut self) -> BoardResult<u64> {
        let state = self.store.state();
        state.check("DBSIZE")?;
        Ok(state.dbs.get(&self.db).map_or(0, |keys| keys.len() as u64))
    }

    async fn dbsize_and_random_keys(&mut self, count: usize) -> BoardResult<(u64, Vec<Vec<u8>>)> {
        let mut state = self.store.state();
        state.check("DBSIZE")?;
        state.check("RANDOMKEY")?;
        let size = state.dbs.get(&self.db).map_or(0, |keys| keys.len() as u64);
        Ok((size, state.random_keys(self.db, count)))
    }

    async fn random_keys(&mut self, count: usize) -> BoardResult<Vec<Vec<u8>>> {
        let mut state = self.store.state();
        state.check("RANDOMKEY")?;
        Ok(state.random_keys(self.db, count))
    }

    async fn keys(&mut self) -> BoardResult<Vec<Vec<u8>>> {
        let state = self.store.state();
        state.check("KEYS")?;
        Ok(state.sorted_keys(self.db))
    }

    async fn debug_objects(&mut self, keys: &[Vec<u8>]) -> BoardResult<Vec<(String, i64)>> {
        let state = self.store.state();
        state.check("DEBUG")?;
        state.check("TTL")?;
        keys.iter()
            .map(|key| {
                let entry = state
                    .entry(self.db, key)
                    .ok_or_else(|| BoardError::command("ERR no such key"))?;
                let reply = format!(
                    "Value at:0x0 refcount:1 encoding:{} serializedlength:{} lru:0 lru_seconds_idle:0",
                    entry.value.encoding(),
                    entry.value.serialized_length()
                );
                Ok((reply, entry.ttl.unwrap_or(-1)))
            })
            .collect()
    }

    async fn get(&mut self, key: &[u8]) -> BoardResult<Option<String>> {
        let state = self.store.state();
        state.check("GET")?;
        match state.entry(self.db, key).map(|e| &e.value) {
            None => Ok(None),
            Some(MemoryValue::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type()),
        }
    }

    async fn lrange(&mut self, key: &[u8], start: i64, stop: i64) -> BoardResult<Vec<String>> {
        self.range("LRANGE", key, start, stop)
    }

    async fn zrange(&mut self, key: &[u8], start: i64, stop: i64) -> BoardResult<Vec<String>> {
        self.range("ZRANGE", key, start, stop)
    }

    async fn smembers(&mut self, key: &[u8]) -> BoardResult<Vec<String>> {
        let state = self.store.state();
        state.check("SMEMBERS")?;
        match state.entry(self.db, key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(MemoryValue::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type()),
        }
    }

    async fn hgetall(&mut self, key: &[u8]) -> BoardResult<Vec<(String, String)>> {
        let state = self.store.state();
        state.check("HGETALL")?;
        match state.entry(self.db, key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(MemoryValue::Hash(fields)) => Ok(fields.clone()),
            Some(_) => Err(wrong_type()),
        }
    }

    async fn del(&mut self, key: &[u8]) -> BoardResult<u64> {
        let mut state = self.store.state();
        state.check("DEL")?;
        let removed = state
            .dbs
            .get_mut(&self.db)
            .and_then(|keys| keys.remove(key))
            .is_some();
        Ok(u64::from(removed))
    }

    async fn info(&mut self) -> BoardResult<String> {
        let state = self.store.state();
        state.check("INFO")?;
        Ok(state.render_info())
    }

    async fn slowlog_get(&mut self, count: usize) -> BoardResult<Vec<SlowlogEntry>> {
        let state = self.store.state();
        state.check("SLOWLOG")?;
        Ok(state.slowlog.iter().take(count).cloned().collect())
    }

    async fn slowlog_len(&mut self) -> BoardResult<u64> {
        let state = self.store.state();
        state.check("SLOWLOG")?;
        Ok(state.slowlog.len() as u64)
    }
}

fn wrong_type() -> BoardError {
    BoardError::command(WRONGTYPE).with_details("WRONGTYPE")
}

fn length_command(length: LengthQuery) -> &'static str {
    match length {
        LengthQuery::Llen => "LLEN",
        LengthQuery::Strlen => "STRLEN",
        LengthQuery::Scard => "SCARD",
        LengthQuery::Zcount => "ZCOUNT",
        LengthQuery::Hlen => "HLEN",
    }
}

/// Inclusive range with negative offsets counted from the end.
fn redis_range(items: &[String], start: i64, stop: i64) -> Vec<String> {
    let len = items.len() as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return Vec::new();
    }
    items[start as usize..=stop as usize].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_redis_range() {
        let list = items(5);
        assert_eq!(redis_range(&list, 0, -1), list);
        assert_eq!(redis_range(&list, 1, 2), vec!["1", "2"]);
        assert_eq!(redis_range(&list, 3, 100), vec!["3", "4"]);
        assert_eq!(redis_range(&list, -2, -1), vec!["3", "4"]);
        assert!(redis_range(&list, 5, 9).is_empty());
        assert!(redis_range(&list, 3, 1).is_empty());
        assert!(redis_range(&[], 0, -1).is_empty());
    }

    #[tokio::test]
    async fn test_select_and_type() {
        let store = MemoryStore::new();
        store.rpush(3, "queue", &["a", "b"]);
        let mut conn = store.connect().await.unwrap();
        assert_eq!(conn.key_type(b"queue").await.unwrap(), "none");
        conn.select(3).await.unwrap();
        assert_eq!(conn.key_type(b"queue").await.unwrap(), "list");
        assert!(conn.select(DATABASES).await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_type_replies() {
        let store = MemoryStore::new();
        store.set_string(0, "name", "redis");
        let mut conn = store.connect().await.unwrap();
        let err = conn.lrange(b"name", 0, -1).await.unwrap_err();
        assert_eq!(err.details.as_deref(), Some("WRONGTYPE"));
        let err = conn.object_batch(b"name", LengthQuery::Hlen).await.unwrap_err();
        assert_eq!(err.kind, BoardErrorKind::CommandError);
    }

    #[tokio::test]
    async fn test_random_keys_round_robin() {
        let store = MemoryStore::new();
        store.set_string(0, "a", "1").set_string(0, "b", "2");
        let mut conn = store.connect().await.unwrap();
        let (size, keys) = conn.dbsize_and_random_keys(3).await.unwrap();
        assert_eq!(size, 2);
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }

    #[tokio::test]
    async fn test_down_store_refuses_connections() {
        let store = MemoryStore::new();
        store.set_down(true);
        let Err(err) = store.connect().await else {
            panic!("connection to a down store should be refused");
        };
        assert!(err.is_connection_failure());
    }

    #[tokio::test]
    async fn test_binary_key_names() {
        let store = MemoryStore::new();
        store.insert(0, [0xff, b'k'], MemoryValue::String("v".into()));
        let mut conn = store.connect().await.unwrap();
        assert_eq!(conn.keys().await.unwrap(), vec![vec![0xff, b'k']]);
        assert_eq!(conn.key_type(&[0xff, b'k']).await.unwrap(), "string");
        assert_eq!(conn.key_type("\u{FFFD}k".as_bytes()).await.unwrap(), "none");
        assert_eq!(conn.del(&[0xff, b'k']).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_info_lists_non_empty_databases() {
        let store = MemoryStore::new();
        store.set_string(2, "k", "v").expire(2, "k", 30);
        let mut conn = store.connect().await.unwrap();
        let info = conn.info().await.unwrap();
        assert!(info.contains("db2:keys=1,expires=1,avg_ttl=0"));
        assert!(!info.contains("db0:"));
    }
}
