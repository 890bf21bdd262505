//! Aggregate service facade for the introspection engine.
//!
//! Owns the settings and compiled detail filters and drives the per-request
//! flow: stats, then database summaries, then per-key detail.

use crate::config::BoardSettings;
use crate::connection::StoreConnection;
use crate::delete;
use crate::error::BoardResult;
use crate::fetcher::{self, KeyRange, ValueRange};
use crate::info::keyspace_databases;
use crate::inspector;
use crate::paginate::{LazySlice, Paginator};
use crate::sampler;
use crate::server::ServerHandle;
use crate::stats;
use crate::types::*;

use log::error;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Alias for shared state in a web host.
pub type RedisboardState = Arc<Redisboard>;

/// Redirect target after a delete.
pub const CHANGELIST_URL: &str = "/servers/";

/// Central introspection service.
#[derive(Debug)]
pub struct Redisboard {
    settings: BoardSettings,
    filters: Vec<Regex>,
}

impl Redisboard {
    /// Validate the settings and compile the detail filters.
    pub fn new(settings: BoardSettings) -> BoardResult<Self> {
        settings.validate()?;
        let filters = settings.compile_detail_filters()?;
        Ok(Self { settings, filters })
    }

    pub fn settings(&self) -> &BoardSettings {
        &self.settings
    }

    fn target(&self) -> &str {
        &self.settings.log_target
    }

    /// Open a connection and collect stats over it. The connection is kept
    /// only when the server is up.
    async fn open(&self, server: &ServerHandle) -> (ServerStats, Option<Box<dyn StoreConnection>>) {
        match server.connect().await {
            Ok(mut conn) => {
                let stats = stats::collect(conn.as_mut(), &self.settings, &self.filters).await;
                let conn = stats.is_up().then_some(conn);
                (stats, conn)
            }
            Err(e) => (stats::stats_for_error(&e, self.target()), None),
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Server stats
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn stats(&self, server: &ServerHandle) -> ServerStats {
        self.open(server).await.0
    }

    /// One row of the server list.
    pub async fn overview(&self, server: &ServerHandle) -> ServerOverview {
        let stats = self.stats(server).await;
        let config = server.config();
        ServerOverview {
            id: config.id,
            name: config.display_name(),
            cpu: stats::cpu_utilization(&stats),
            slowlog: stats::slowlog_summary(&stats),
            status: stats.status,
            memory: stats.memory,
            clients: stats.clients,
            details: stats.brief_details,
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Inspection
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Build the inspect page for `server`.
    ///
    /// With a `key` parameter only that key is shown. Otherwise every database
    /// is summarised, and per-key detail is added for all of them when the
    /// server is small, or just for the requested one when it is not.
    pub async fn inspect(&self, request: &InspectRequest, server: &ServerHandle) -> InspectOutcome {
        let (stats, conn) = self.open(server).await;
        let mut view = InspectView {
            databases: BTreeMap::new(),
            key_details: None,
            original: server.config().clone(),
            stats,
        };
        let Some(mut conn) = conn else {
            return InspectOutcome::Rendered(Box::new(view));
        };

        if let Some(key) = request.key.as_deref() {
            let Some(db) = parse_db(request.db.as_deref()) else {
                return InspectOutcome::UnknownDatabase;
            };
            let page = request.page.as_deref();
            view.key_details = Some(
                self.key_details(conn.as_mut(), db, key.as_bytes(), page)
                    .await,
            );
            return InspectOutcome::Rendered(Box::new(view));
        }

        let databases = keyspace_databases(view.stats.details.keys());
        match self
            .aggregate(conn.as_mut(), server.config(), &databases, request.db.as_deref())
            .await
        {
            Some(rows) => {
                view.databases = rows;
                InspectOutcome::Rendered(Box::new(view))
            }
            None => InspectOutcome::UnknownDatabase,
        }
    }

    /// Summaries for `databases`, with detail for all of them when the total
    /// key count is under the sampling threshold, else only for `requested`.
    /// `None` when `requested` is needed but names no listed database.
    pub async fn aggregate(
        &self,
        conn: &mut dyn StoreConnection,
        server: &ServerConfig,
        databases: &[u32],
        requested: Option<&str>,
    ) -> Option<BTreeMap<u32, DatabaseView>> {
        let mut rows = BTreeMap::new();
        let mut total_size = 0u64;
        for &db in databases {
            let summary = sampler::summarize(&mut *conn, server, db, self.target()).await;
            total_size += summary.size;
            rows.insert(db, DatabaseView::summary_only(summary));
        }

        let detailed: Vec<u32> = if total_size < server.sampling_threshold {
            databases.to_vec()
        } else if let Some(requested) = requested {
            match requested.trim().parse::<u32>() {
                Ok(db) if rows.contains_key(&db) => vec![db],
                _ => return None,
            }
        } else {
            Vec::new()
        };

        for db in detailed {
            let detail = sampler::detail(&mut *conn, server, db, self.target()).await;
            if let Some(row) = rows.get_mut(&db) {
                row.activate(detail);
            }
        }
        Some(rows)
    }

    /// Metadata and contents of one key. Lists and sorted sets are paged;
    /// other types are returned whole.
    pub async fn key_details(
        &self,
        conn: &mut dyn StoreConnection,
        db: u32,
        key: &[u8],
        page: Option<&str>,
    ) -> KeyDetails {
        let name = key_label(key);
        if let Err(e) = conn.select(db).await {
            error!(target: self.target(), "Cannot select db{db} to show {name:?}: {e}");
            return KeyDetails {
                metadata: KeyMetadata::unavailable(name, Metric::NotAvailable, e.message),
                db,
                data: KeyData::All(Vec::new()),
            };
        }

        let mut metadata = inspector::inspect(&mut *conn, key, self.target()).await;
        let key_type = metadata.detected_type().unwrap_or(KeyType::None);

        let data = if key_type.is_ranged() {
            let len = metadata.length.known().copied().unwrap_or(0);
            let paginator = Paginator::new(self.settings.items_per_page);
            let number = paginator.resolve(page, len);
            let mut slice = LazySlice::new(len, KeyRange::new(&mut *conn, key, key_type));
            paginator.page(&mut slice, number).await.map(KeyData::Page)
        } else {
            fetcher::fetch(&mut *conn, key, key_type, ValueRange::all())
                .await
                .map(KeyData::All)
        };

        let data = match data {
            Ok(data) => data,
            Err(e) => {
                error!(target: self.target(), "Failed to read value of {name:?} in db{db}: {e}");
                metadata.error.get_or_insert(e.message);
                KeyData::All(Vec::new())
            }
        };

        KeyDetails { metadata, db, data }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Deletion
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Delete the requested key and describe the result for the operator.
    pub async fn delete(&self, request: &DeleteRequest, server: &ServerHandle) -> DeleteResponse {
        let (_, conn) = self.open(server).await;
        let Some(mut conn) = conn else {
            return DeleteResponse::error("Server is down");
        };
        let Some(key) = request.key.as_deref() else {
            return DeleteResponse::error("No key given");
        };

        let outcome = match parse_db(request.db.as_deref()) {
            Some(db) => delete::delete(conn.as_mut(), db, key.as_bytes(), self.target()).await,
            None => DeleteOutcome::DbUnreachable,
        };

        let (level, message) = match &outcome {
            DeleteOutcome::Deleted => (MessageLevel::Success, format!("Key {key} deleted.")),
            DeleteOutcome::DbUnreachable => (MessageLevel::Error, "DB connection failed".to_string()),
            DeleteOutcome::KeyNotFound | DeleteOutcome::Failed(_) => {
                (MessageLevel::Error, format!("Unable to delete key {key}"))
            }
        };

        DeleteResponse {
            level,
            message,
            outcome: Some(outcome),
        }
    }
}

/// Database index from the `db` parameter; absent means 0.
fn parse_db(raw: Option<&str>) -> Option<u32> {
    match raw {
        None => Some(0),
        Some(raw) => raw.trim().parse().ok(),
    }
}
