//! Type-dependent retrieval of key contents.

use crate::connection::StoreConnection;
use crate::error::BoardResult;
use crate::paginate::RangeSource;
use crate::types::{KeyType, Position, ValueEntry};
use async_trait::async_trait;

/// Index window for list and sorted-set reads. `stop` is inclusive; `None`
/// reads to the end. Ignored for the other types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRange {
    pub start: u64,
    pub stop: Option<u64>,
}

impl ValueRange {
    pub fn all() -> Self {
        Self {
            start: 0,
            stop: None,
        }
    }

    /// The half-open window `[start, end)`. `end` must be greater than `start`.
    pub fn window(start: u64, end: u64) -> Self {
        Self {
            start,
            stop: Some(end.saturating_sub(1)),
        }
    }
}

/// Read the value of `key` as `(position, value)` pairs.
///
/// Lists and sorted sets honour `range` and report absolute indexes. A string
/// is a single `("string", value)` pair, set members are enumerated from 0,
/// hashes pair each field with its value. Type `none` yields nothing.
pub async fn fetch(
    conn: &mut dyn StoreConnection,
    key: &[u8],
    key_type: KeyType,
    range: ValueRange,
) -> BoardResult<Vec<ValueEntry>> {
    match key_type {
        KeyType::List | KeyType::ZSet => {
            let start = range.start as i64;
            let stop = range.stop.map_or(-1, |s| s as i64);
            let values = if key_type == KeyType::List {
                conn.lrange(key, start, stop).await?
            } else {
                conn.zrange(key, start, stop).await?
            };
            Ok(indexed(values, range.start))
        }
        KeyType::String => Ok(conn
            .get(key)
            .await?
            .map(|value| vec![ValueEntry(Position::Scalar, value)])
            .unwrap_or_default()),
        KeyType::Set => Ok(indexed(conn.smembers(key).await?, 0)),
        KeyType::Hash => Ok(conn
            .hgetall(key)
            .await?
            .into_iter()
            .map(|(field, value)| ValueEntry(Position::Field(field), value))
            .collect()),
        KeyType::None => Ok(Vec::new()),
    }
}

fn indexed(values: Vec<String>, offset: u64) -> Vec<ValueEntry> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| ValueEntry(Position::Index(offset + i as u64), value))
        .collect()
}

/// A ranged key as a [`RangeSource`] for lazy paging.
pub struct KeyRange<'a> {
    conn: &'a mut dyn StoreConnection,
    key: &'a [u8],
    key_type: KeyType,
}

impl<'a> KeyRange<'a> {
    pub fn new(conn: &'a mut dyn StoreConnection, key: &'a [u8], key_type: KeyType) -> Self {
        Self {
            conn,
            key,
            key_type,
        }
    }
}

#[async_trait]
impl<'a> RangeSource for KeyRange<'a> {
    type Item = ValueEntry;

    async fn fetch_range(&mut self, start: u64, end: u64) -> BoardResult<Vec<ValueEntry>> {
        fetch(
            &mut *self.conn,
            self.key,
            self.key_type,
            ValueRange::window(start, end),
        )
        .await
    }
}
