//! Single-key deletion.

use crate::connection::StoreConnection;
use crate::types::{key_label, DeleteOutcome};
use log::{error, info, warn};

/// Remove `key` from database `db`.
pub async fn delete(
    conn: &mut dyn StoreConnection,
    db: u32,
    key: &[u8],
    log_target: &str,
) -> DeleteOutcome {
    let name = key_label(key);
    if let Err(e) = conn.select(db).await {
        warn!(target: log_target, "Cannot select db{db} to delete {name:?}: {e}");
        return DeleteOutcome::DbUnreachable;
    }

    match conn.del(key).await {
        Ok(0) => DeleteOutcome::KeyNotFound,
        Ok(_) => {
            info!(target: log_target, "Deleted key {name:?} from db{db}");
            DeleteOutcome::Deleted
        }
        Err(e) => {
            error!(target: log_target, "Failed to delete key {name:?} from db{db}: {e}");
            DeleteOutcome::Failed(e.message)
        }
    }
}
