//! Per-key metadata collection.

use crate::connection::StoreConnection;
use crate::types::{key_label, KeyMetadata, KeyType, Metric};
use log::error;

/// Collect type, length, TTL and OBJECT details for one key in the currently
/// selected database.
///
/// Never fails: a TYPE error leaves every field unavailable, a missing key is
/// reported as type `none`, and a failed OBJECT batch keeps the detected type
/// but nothing else. In each case the reason lands in `error`.
pub async fn inspect(conn: &mut dyn StoreConnection, key: &[u8], log_target: &str) -> KeyMetadata {
    let name = key_label(key);
    let reply = match conn.key_type(key).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(target: log_target, "Failed to read type of key {name:?}: {e}");
            return KeyMetadata::unavailable(name, Metric::NotAvailable, e.message);
        }
    };

    let key_type = KeyType::from_reply(&reply);
    let Some(length) = key_type.length_query() else {
        return KeyMetadata::missing(name);
    };

    match conn.object_batch(key, length).await {
        Ok(batch) => KeyMetadata {
            name,
            key_type: Metric::Known(key_type),
            length: Metric::Known(batch.length),
            ttl: Metric::Known(batch.ttl),
            refcount: Metric::Known(batch.refcount),
            encoding: Metric::Known(batch.encoding),
            idletime: Metric::Known(batch.idletime),
            error: None,
        },
        Err(e) => {
            error!(target: log_target, "Failed to read object details of key {name:?}: {e}");
            KeyMetadata::unavailable(name, Metric::Known(key_type), e.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionProvider;
    use crate::memory::{MemoryStore, MemoryValue};
    use crate::types::MISSING_KEY_ERROR;

    #[tokio::test]
    async fn test_inspect_list() {
        let store = MemoryStore::new();
        store.rpush(0, "jobs", &["a", "b", "c"]).expire(0, "jobs", 60);
        let mut conn = store.connect().await.unwrap();

        let meta = inspect(conn.as_mut(), b"jobs", "test").await;
        assert_eq!(meta.key_type, Metric::Known(KeyType::List));
        assert_eq!(meta.length, Metric::Known(3));
        assert_eq!(meta.ttl, Metric::Known(60));
        assert_eq!(meta.refcount, Metric::Known(1));
        assert_eq!(meta.encoding, Metric::Known("quicklist".to_string()));
        assert!(meta.error.is_none());
    }

    #[tokio::test]
    async fn test_inspect_zset_uses_full_score_range() {
        let store = MemoryStore::new();
        store.zadd(0, "board", &[("x", -5.0), ("y", 1e9)]);
        let mut conn = store.connect().await.unwrap();

        let meta = inspect(conn.as_mut(), b"board", "test").await;
        assert_eq!(meta.length, Metric::Known(2));
        assert_eq!(meta.ttl, Metric::Known(-1));
    }

    #[tokio::test]
    async fn test_inspect_string_length() {
        let store = MemoryStore::new();
        store.set_string(0, "greeting", "hello world");
        let mut conn = store.connect().await.unwrap();

        let meta = inspect(conn.as_mut(), b"greeting", "test").await;
        assert_eq!(meta.key_type, Metric::Known(KeyType::String));
        assert_eq!(meta.length, Metric::Known(11));
        assert_eq!(meta.encoding, Metric::Known("embstr".to_string()));
    }

    #[tokio::test]
    async fn test_inspect_set_length() {
        let store = MemoryStore::new();
        store.sadd(0, "tags", &["red", "green", "blue", "red"]);
        let mut conn = store.connect().await.unwrap();

        let meta = inspect(conn.as_mut(), b"tags", "test").await;
        assert_eq!(meta.key_type, Metric::Known(KeyType::Set));
        assert_eq!(meta.length, Metric::Known(3));
    }

    #[tokio::test]
    async fn test_inspect_hash_length() {
        let store = MemoryStore::new();
        store.hset(0, "user:1", &[("name", "ada"), ("lang", "en")]).expire(0, "user:1", 0);
        let mut conn = store.connect().await.unwrap();

        let meta = inspect(conn.as_mut(), b"user:1", "test").await;
        assert_eq!(meta.key_type, Metric::Known(KeyType::Hash));
        assert_eq!(meta.length, Metric::Known(2));
        assert_eq!(meta.ttl, Metric::Known(0));
    }

    #[tokio::test]
    async fn test_inspect_binary_key_name() {
        let store = MemoryStore::new();
        store.insert(0, [0xff, b'q'], MemoryValue::List(vec!["a".into()]));
        let mut conn = store.connect().await.unwrap();

        let meta = inspect(conn.as_mut(), &[0xff, b'q'], "test").await;
        assert_eq!(meta.name, "\\xffq");
        assert_eq!(meta.key_type, Metric::Known(KeyType::List));
        assert_eq!(meta.length, Metric::Known(1));
        assert!(meta.error.is_none());
    }

    #[tokio::test]
    async fn test_inspect_missing_key() {
        let store = MemoryStore::new();
        let mut conn = store.connect().await.unwrap();

        let meta = inspect(conn.as_mut(), b"ghost", "test").await;
        assert_eq!(meta.key_type, Metric::Known(KeyType::None));
        assert_eq!(meta.length, Metric::NotAvailable);
        assert_eq!(meta.ttl, Metric::NotAvailable);
        assert_eq!(meta.error.as_deref(), Some(MISSING_KEY_ERROR));
    }

    #[tokio::test]
    async fn test_inspect_type_failure() {
        let store = MemoryStore::new();
        store.set_string(0, "k", "v").fail_command("TYPE");
        let mut conn = store.connect().await.unwrap();

        let meta = inspect(conn.as_mut(), b"k", "test").await;
        assert_eq!(meta.key_type, Metric::NotAvailable);
        assert_eq!(meta.encoding, Metric::NotAvailable);
        assert!(meta.error.unwrap().contains("TYPE"));
    }

    #[tokio::test]
    async fn test_inspect_type_changed_between_round_trips() {
        let store = MemoryStore::new();
        store.set_string(0, "k", "v").report_type("k", "hash");
        let mut conn = store.connect().await.unwrap();

        let meta = inspect(conn.as_mut(), b"k", "test").await;
        assert_eq!(meta.key_type, Metric::Known(KeyType::Hash));
        assert_eq!(meta.length, Metric::NotAvailable);
        assert_eq!(meta.refcount, Metric::NotAvailable);
        assert!(meta.error.unwrap().starts_with("WRONGTYPE"));
    }
}
