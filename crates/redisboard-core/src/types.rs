//! Types for server registrations, key metadata, database summaries, server
//! stats, and the view models handed back to the host.

use crate::paginate::Page;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

// ── Server registration ─────────────────────────────────────────────

fn default_hostname() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    6379
}

fn default_sampling_threshold() -> u64 {
    1000
}

fn default_sampling_size() -> usize {
    200
}

/// A registered Redis endpoint, as stored by the host application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: u64,
    /// Human-readable label.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Unix socket path. When set, hostname and port are ignored.
    #[serde(default)]
    pub socket_path: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Key count above which databases are sampled instead of enumerated.
    #[serde(default = "default_sampling_threshold")]
    pub sampling_threshold: u64,
    /// Number of random keys drawn when sampling.
    #[serde(default = "default_sampling_size")]
    pub sampling_size: usize,
}

impl ServerConfig {
    pub fn new(id: u64, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            label: None,
            hostname: hostname.into(),
            port,
            socket_path: None,
            password: None,
            sampling_threshold: default_sampling_threshold(),
            sampling_size: default_sampling_size(),
        }
    }

    /// Connection parameters for database 0. The password is passed verbatim,
    /// not through a URL.
    pub fn connection_info(&self) -> redis::ConnectionInfo {
        let addr = match self.socket_path {
            Some(ref path) => redis::ConnectionAddr::Unix(path.into()),
            None => redis::ConnectionAddr::Tcp(self.hostname.clone(), self.port),
        };
        redis::ConnectionInfo {
            addr,
            redis: redis::RedisConnectionInfo {
                db: 0,
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }

    /// Label if set, otherwise the address.
    pub fn display_name(&self) -> String {
        if let Some(ref label) = self.label {
            return label.clone();
        }
        match self.socket_path {
            Some(ref path) => path.clone(),
            None => format!("{}:{}", self.hostname, self.port),
        }
    }
}

// ── Key types ───────────────────────────────────────────────────────

/// Redis key type classification. Anything TYPE reports that is not one of
/// the five core types (including a missing key) maps to `None`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    String,
    List,
    Set,
    #[serde(rename = "zset")]
    ZSet,
    Hash,
    None,
}

impl KeyType {
    pub fn from_reply(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "string" => Self::String,
            "list" => Self::List,
            "set" => Self::Set,
            "zset" => Self::ZSet,
            "hash" => Self::Hash,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::List => "list",
            Self::Set => "set",
            Self::ZSet => "zset",
            Self::Hash => "hash",
            Self::None => "none",
        }
    }

    /// The command that measures a key of this type.
    pub fn length_query(&self) -> Option<LengthQuery> {
        match self {
            Self::String => Some(LengthQuery::Strlen),
            Self::List => Some(LengthQuery::Llen),
            Self::Set => Some(LengthQuery::Scard),
            Self::ZSet => Some(LengthQuery::Zcount),
            Self::Hash => Some(LengthQuery::Hlen),
            Self::None => None,
        }
    }

    /// List and sorted-set values can be fetched by index range.
    pub fn is_ranged(&self) -> bool {
        matches!(self, Self::List | Self::ZSet)
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific length command sent inside the inspection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthQuery {
    Llen,
    Strlen,
    Scard,
    /// ZCOUNT over the full score range.
    Zcount,
    Hlen,
}

// ── Metrics ─────────────────────────────────────────────────────────

/// A value that may be unavailable. Renders as `"n/a"` when missing.
#[derive(Debug, Clone, PartialEq)]
pub enum Metric<T> {
    Known(T),
    NotAvailable,
}

impl<T> Metric<T> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Self::Known(v) => Some(v),
            Self::NotAvailable => None,
        }
    }
}

impl<T> From<Option<T>> for Metric<T> {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => Self::Known(v),
            None => Self::NotAvailable,
        }
    }
}

impl<T: Serialize> Serialize for Metric<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(v) => v.serialize(serializer),
            Self::NotAvailable => serializer.serialize_str("n/a"),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Metric<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(v) => v.fmt(f),
            Self::NotAvailable => f.write_str("n/a"),
        }
    }
}

// ── Key metadata ────────────────────────────────────────────────────

pub const MISSING_KEY_ERROR: &str = "The key does not exist";

/// Display form of a key name: the name itself when it is UTF-8, otherwise
/// its bytes with non-printable ones escaped as `\xNN`.
pub fn key_label(key: &[u8]) -> String {
    match std::str::from_utf8(key) {
        Ok(name) => name.to_string(),
        Err(_) => key.escape_ascii().to_string(),
    }
}

/// Everything the inspector learned about one key.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KeyMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub key_type: Metric<KeyType>,
    pub length: Metric<u64>,
    pub ttl: Metric<i64>,
    pub refcount: Metric<i64>,
    pub encoding: Metric<String>,
    pub idletime: Metric<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl KeyMetadata {
    /// Metadata with every derived field unavailable.
    pub fn unavailable(
        name: impl Into<String>,
        key_type: Metric<KeyType>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            key_type,
            length: Metric::NotAvailable,
            ttl: Metric::NotAvailable,
            refcount: Metric::NotAvailable,
            encoding: Metric::NotAvailable,
            idletime: Metric::NotAvailable,
            error: Some(error.into()),
        }
    }

    pub fn missing(name: impl Into<String>) -> Self {
        Self::unavailable(name, Metric::Known(KeyType::None), MISSING_KEY_ERROR)
    }

    /// The detected type, if detection succeeded.
    pub fn detected_type(&self) -> Option<KeyType> {
        self.key_type.known().copied()
    }
}

/// Replies of the pipelined OBJECT/length/TTL batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectBatch {
    pub refcount: i64,
    pub encoding: String,
    pub idletime: i64,
    pub length: u64,
    pub ttl: i64,
}

// ── Values ──────────────────────────────────────────────────────────

/// Where a value sits inside its key.
#[derive(Debug, Clone, PartialEq)]
pub enum Position {
    /// Offset in a list, sorted set, or enumerated set.
    Index(u64),
    /// Hash field name.
    Field(String),
    /// The single value of a string key.
    Scalar,
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Index(i) => serializer.serialize_u64(*i),
            Self::Field(f) => serializer.serialize_str(f),
            Self::Scalar => serializer.serialize_str("string"),
        }
    }
}

/// A `(position, value)` pair; serialises as a two element array.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValueEntry(pub Position, pub String);

/// Key contents: a lazily fetched page for lists and sorted sets, the whole
/// value for everything else.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum KeyData {
    Page(Page<ValueEntry>),
    All(Vec<ValueEntry>),
}

/// Key metadata plus the requested slice of its contents.
#[derive(Debug, Clone, Serialize)]
pub struct KeyDetails {
    #[serde(flatten)]
    pub metadata: KeyMetadata,
    pub db: u32,
    pub data: KeyData,
}

// ── Databases ───────────────────────────────────────────────────────

/// Sampling-based estimate for one logical database.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DatabaseSummary {
    /// Total key count (DBSIZE).
    pub size: u64,
    pub total_memory: f64,
    pub volatile_memory: f64,
    pub persistent_memory: f64,
    /// Distinct keys the estimate was extrapolated from.
    pub sampled_keys: usize,
}

/// Per-key metadata for a database, complete or sampled.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatabaseDetail {
    pub keys: BTreeMap<String, KeyMetadata>,
    pub sampling: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One row of the inspect page's database table.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseView {
    #[serde(flatten)]
    pub summary: DatabaseSummary,
    #[serde(flatten)]
    pub detail: Option<DatabaseDetail>,
    pub active: bool,
}

impl DatabaseView {
    pub fn summary_only(summary: DatabaseSummary) -> Self {
        Self {
            summary,
            detail: None,
            active: false,
        }
    }

    pub fn activate(&mut self, detail: DatabaseDetail) {
        self.detail = Some(detail);
        self.active = true;
    }
}

// ── Server stats ────────────────────────────────────────────────────

/// Reachability of a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStatus {
    Up,
    Down,
    /// Reachable, but the server rejected the stats commands.
    Error(String),
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("UP"),
            Self::Down => f.write_str("DOWN"),
            Self::Error(msg) => write!(f, "ERROR: {}", msg),
        }
    }
}

impl Serialize for ServerStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Slow log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlowlogEntry {
    pub id: i64,
    pub timestamp: i64,
    pub duration_us: i64,
    pub command: Vec<String>,
    pub client_addr: Option<String>,
    pub client_name: Option<String>,
}

/// Top-level status of a server at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStats {
    pub status: ServerStatus,
    /// Flattened INFO output.
    pub details: BTreeMap<String, String>,
    pub memory: Metric<String>,
    pub clients: Metric<String>,
    /// INFO fields selected by the configured detail filters.
    pub brief_details: BTreeMap<String, String>,
    pub slowlog: Vec<SlowlogEntry>,
    pub slowlog_len: u64,
    pub collected_at: String,
}

impl ServerStats {
    pub fn unavailable(status: ServerStatus) -> Self {
        Self {
            status,
            details: BTreeMap::new(),
            memory: Metric::NotAvailable,
            clients: Metric::NotAvailable,
            brief_details: BTreeMap::new(),
            slowlog: Vec::new(),
            slowlog_len: 0,
            collected_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == ServerStatus::Up
    }
}

/// CPU counters from INFO plus their ratio to uptime.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CpuUtilization {
    pub used_cpu_sys: f64,
    pub used_cpu_sys_children: f64,
    pub used_cpu_user: f64,
    pub used_cpu_user_children: f64,
    pub cpu_utilization: String,
}

/// Slow log rendered as display lines, longest first, after a total line.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SlowlogSummary {
    pub total: u64,
    pub lines: Vec<String>,
}

/// One row of the server list.
#[derive(Debug, Clone, Serialize)]
pub struct ServerOverview {
    pub id: u64,
    pub name: String,
    pub status: ServerStatus,
    pub memory: Metric<String>,
    pub clients: Metric<String>,
    pub details: BTreeMap<String, String>,
    pub cpu: Metric<CpuUtilization>,
    pub slowlog: SlowlogSummary,
}

// ── Requests and views ──────────────────────────────────────────────

/// Query parameters of the inspect route, as plain strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectRequest {
    pub key: Option<String>,
    pub db: Option<String>,
    pub page: Option<String>,
}

/// Query parameters of the delete route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub key: Option<String>,
    pub db: Option<String>,
}

/// Everything the inspect page renders.
#[derive(Debug, Clone, Serialize)]
pub struct InspectView {
    pub databases: BTreeMap<u32, DatabaseView>,
    pub key_details: Option<KeyDetails>,
    pub original: ServerConfig,
    pub stats: ServerStats,
}

#[derive(Debug, Clone)]
pub enum InspectOutcome {
    Rendered(Box<InspectView>),
    /// The caller asked for a database the server does not report.
    UnknownDatabase,
}

/// Result of a single-key delete.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    DbUnreachable,
    KeyNotFound,
    Failed(String),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Success,
    Error,
}

/// Status message shown after a delete request.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub level: MessageLevel,
    pub message: String,
    pub outcome: Option<DeleteOutcome>,
}

impl DeleteResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            message: message.into(),
            outcome: None,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
