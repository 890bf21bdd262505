//! Engine settings, passed explicitly into [`crate::service::Redisboard`].

use crate::error::{BoardError, BoardResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// INFO fields shown in a server's brief details, by default.
pub const DEFAULT_DETAIL_FILTERS: &[&str] = &[
    "aof_enabled",
    "bgrewriteaof_in_progress",
    "bgsave_in_progress",
    "changes_since_last_save",
    "db.*",
    "last_save_time",
    "multiplexing_api",
    "total_commands_processed",
    "total_connections_received",
    "uptime_in_days",
    "uptime_in_seconds",
    "vm_enabled",
    "redis_version",
];

fn default_items_per_page() -> usize {
    100
}

fn default_slowlog_len() -> usize {
    10
}

fn default_detail_filters() -> Vec<String> {
    DEFAULT_DETAIL_FILTERS.iter().map(|s| s.to_string()).collect()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_log_target() -> String {
    "redisboard".into()
}

/// Engine-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSettings {
    /// Page size for list and sorted-set values.
    #[serde(default = "default_items_per_page")]
    pub items_per_page: usize,
    /// Number of slow log entries fetched per server.
    #[serde(default = "default_slowlog_len")]
    pub slowlog_len: usize,
    /// Regexes (matched from the start of the name) selecting INFO fields for
    /// the brief details column.
    #[serde(default = "default_detail_filters")]
    pub detail_filters: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub response_timeout_secs: u64,
    /// `log` target used for every record the engine emits.
    #[serde(default = "default_log_target")]
    pub log_target: String,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            items_per_page: default_items_per_page(),
            slowlog_len: default_slowlog_len(),
            detail_filters: default_detail_filters(),
            connect_timeout_secs: default_timeout_secs(),
            response_timeout_secs: default_timeout_secs(),
            log_target: default_log_target(),
        }
    }
}

impl BoardSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    /// Compile the detail filters, anchored at the start of the field name.
    pub fn compile_detail_filters(&self) -> BoardResult<Vec<Regex>> {
        self.detail_filters
            .iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{})", pattern)).map_err(|e| {
                    BoardError::invalid_config(format!("Bad detail filter {pattern:?}"))
                        .with_details(e.to_string())
                })
            })
            .collect()
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> BoardResult<()> {
        if self.items_per_page == 0 {
            return Err(BoardError::invalid_config("items_per_page must be at least 1"));
        }
        self.compile_detail_filters()?;
        Ok(())
    }
}
