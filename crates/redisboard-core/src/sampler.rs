//! Database-level memory estimation and key listing.
//!
//! Memory is estimated from a random sample: each sampled key costs its
//! `serializedlength` plus the length of its name, and the per-key average of
//! each bucket (all, volatile, persistent) is scaled up to the database size.

use crate::connection::StoreConnection;
use crate::error::{BoardError, BoardErrorKind, BoardResult};
use crate::info::parse_serialized_length;
use crate::inspector::inspect;
use crate::types::{key_label, DatabaseDetail, DatabaseSummary, ServerConfig};
use log::{debug, error};
use std::collections::{BTreeMap, BTreeSet};

/// One sampled key, as the estimator sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySample {
    pub name_len: u64,
    pub serialized_length: u64,
    /// TTL reply; negative means no expiry.
    pub ttl: i64,
}

impl KeySample {
    fn cost(&self) -> u64 {
        self.serialized_length + self.name_len
    }

    fn is_volatile(&self) -> bool {
        self.ttl >= 0
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    bytes: u64,
    keys: u64,
}

impl Bucket {
    fn add(&mut self, cost: u64) {
        self.bytes += cost;
        self.keys += 1;
    }

    fn extrapolate(&self, size: u64) -> f64 {
        if self.keys == 0 {
            return 0.0;
        }
        self.bytes as f64 / self.keys as f64 * size as f64
    }
}

/// Scale the sampled per-key averages up to `size` keys.
pub fn estimate(size: u64, samples: &[KeySample]) -> DatabaseSummary {
    let mut total = Bucket::default();
    let mut volatile = Bucket::default();
    let mut persistent = Bucket::default();

    for sample in samples {
        let cost = sample.cost();
        total.add(cost);
        if sample.is_volatile() {
            volatile.add(cost);
        } else {
            persistent.add(cost);
        }
    }

    DatabaseSummary {
        size,
        total_memory: total.extrapolate(size),
        volatile_memory: volatile.extrapolate(size),
        persistent_memory: persistent.extrapolate(size),
        sampled_keys: samples.len(),
    }
}

/// Estimate memory use of database `db`. Any failure is logged and yields an
/// all-zero summary.
pub async fn summarize(
    conn: &mut dyn StoreConnection,
    server: &ServerConfig,
    db: u32,
    log_target: &str,
) -> DatabaseSummary {
    match sample_db(conn, server, db).await {
        Ok(summary) => {
            debug!(
                target: log_target,
                "Sampled {} of {} keys in db{db} of {}",
                summary.sampled_keys,
                summary.size,
                server.display_name()
            );
            summary
        }
        Err(e) => {
            error!(
                target: log_target,
                "Failed to estimate memory of db{db} on {}: {e}",
                server.display_name()
            );
            DatabaseSummary::default()
        }
    }
}

async fn sample_db(
    conn: &mut dyn StoreConnection,
    server: &ServerConfig,
    db: u32,
) -> BoardResult<DatabaseSummary> {
    conn.select(db).await?;
    let draws = usize::try_from(server.sampling_threshold).unwrap_or(usize::MAX);
    let (size, drawn) = conn.dbsize_and_random_keys(draws).await?;
    let keys: Vec<Vec<u8>> = drawn
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let replies = conn.debug_objects(&keys).await?;
    let samples = keys
        .iter()
        .zip(replies)
        .map(|(key, (reply, ttl))| {
            let serialized_length = parse_serialized_length(&reply).ok_or_else(|| {
                BoardError::new(
                    BoardErrorKind::TypeError,
                    format!(
                        "DEBUG OBJECT reply for {:?} has no serializedlength",
                        key_label(key)
                    ),
                )
            })?;
            Ok(KeySample {
                name_len: key.len() as u64,
                serialized_length,
                ttl,
            })
        })
        .collect::<BoardResult<Vec<_>>>()?;

    Ok(estimate(size, &samples))
}

/// Per-key metadata for database `db`: every key when the database holds no
/// more than the sampling threshold, otherwise a random sample. Failures are
/// logged and reported in `error` with an empty key map.
pub async fn detail(
    conn: &mut dyn StoreConnection,
    server: &ServerConfig,
    db: u32,
    log_target: &str,
) -> DatabaseDetail {
    match list_db(conn, server, db, log_target).await {
        Ok(detail) => detail,
        Err(e) => {
            error!(
                target: log_target,
                "Failed to list keys of db{db} on {}: {e}",
                server.display_name()
            );
            DatabaseDetail {
                keys: BTreeMap::new(),
                sampling: false,
                error: Some(e.message),
            }
        }
    }
}

async fn list_db(
    conn: &mut dyn StoreConnection,
    server: &ServerConfig,
    db: u32,
    log_target: &str,
) -> BoardResult<DatabaseDetail> {
    conn.select(db).await?;
    let size = conn.dbsize().await?;
    let sampling = size > server.sampling_threshold;
    let names = if sampling {
        conn.random_keys(server.sampling_size).await?
    } else {
        conn.keys().await?
    };

    let mut keys = BTreeMap::new();
    for name in names.into_iter().collect::<BTreeSet<_>>() {
        let metadata = inspect(&mut *conn, &name, log_target).await;
        keys.insert(metadata.name.clone(), metadata);
    }

    Ok(DatabaseDetail {
        keys,
        sampling,
        error: None,
    })
}
