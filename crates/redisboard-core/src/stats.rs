//! Server status, INFO details and the derived overview columns.

use crate::config::BoardSettings;
use crate::connection::StoreConnection;
use crate::error::{BoardError, BoardResult};
use crate::info::parse_info;
use crate::types::{CpuUtilization, Metric, ServerStats, ServerStatus, SlowlogSummary};
use log::{error, warn};
use regex::Regex;
use std::collections::BTreeMap;

/// Longest slow log command shown before truncation.
const MAX_COMMAND_LEN: usize = 255;

/// Gather INFO and the slow log over an open connection.
///
/// Connection-level failures mark the server `DOWN`; a rejected command
/// (NOAUTH, a disabled SLOWLOG...) marks it `ERROR` with the server's message.
pub async fn collect(
    conn: &mut dyn StoreConnection,
    settings: &BoardSettings,
    filters: &[Regex],
) -> ServerStats {
    match gather(conn, settings, filters).await {
        Ok(stats) => stats,
        Err(e) => stats_for_error(&e, &settings.log_target),
    }
}

/// Stats for a server that could not be queried.
pub fn stats_for_error(e: &BoardError, log_target: &str) -> ServerStats {
    if e.is_connection_failure() {
        warn!(target: log_target, "Server is down: {e}");
        ServerStats::unavailable(ServerStatus::Down)
    } else {
        error!(target: log_target, "Failed to collect server stats: {e}");
        ServerStats::unavailable(ServerStatus::Error(e.message.clone()))
    }
}

async fn gather(
    conn: &mut dyn StoreConnection,
    settings: &BoardSettings,
    filters: &[Regex],
) -> BoardResult<ServerStats> {
    let info = parse_info(&conn.info().await?);
    let slowlog = conn.slowlog_get(settings.slowlog_len).await?;
    let slowlog_len = conn.slowlog_len().await?;

    let details = info.flatten();
    let memory = format!(
        "{} (peak: {})",
        info.get("used_memory_human").unwrap_or("n/a"),
        info.get("used_memory_peak_human").unwrap_or("n/a")
    );

    Ok(ServerStats {
        status: ServerStatus::Up,
        brief_details: brief_details(&details, filters),
        memory: Metric::Known(memory),
        clients: info.get("connected_clients").map(str::to_string).into(),
        details,
        slowlog,
        slowlog_len,
        collected_at: chrono::Utc::now().to_rfc3339(),
    })
}

/// INFO fields whose name matches any filter.
pub fn brief_details(
    details: &BTreeMap<String, String>,
    filters: &[Regex],
) -> BTreeMap<String, String> {
    details
        .iter()
        .filter(|(name, _)| filters.iter().any(|f| f.is_match(name)))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// CPU counters and their sum relative to uptime. Unavailable unless the
/// server is up.
pub fn cpu_utilization(stats: &ServerStats) -> Metric<CpuUtilization> {
    if !stats.is_up() {
        return Metric::NotAvailable;
    }
    let field = |name: &str| {
        stats
            .details
            .get(name)
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0)
    };

    let used_cpu_sys = field("used_cpu_sys");
    let used_cpu_sys_children = field("used_cpu_sys_children");
    let used_cpu_user = field("used_cpu_user");
    let used_cpu_user_children = field("used_cpu_user_children");
    let uptime = field("uptime_in_seconds");

    let busy = used_cpu_sys + used_cpu_sys_children + used_cpu_user + used_cpu_user_children;
    let ratio = if uptime > 0.0 { busy / uptime } else { 0.0 };

    Metric::Known(CpuUtilization {
        used_cpu_sys,
        used_cpu_sys_children,
        used_cpu_user,
        used_cpu_user_children,
        cpu_utilization: format!("{ratio:.3}%"),
    })
}

/// Slow log as display lines: a total line, then entries slowest first.
pub fn slowlog_summary(stats: &ServerStats) -> SlowlogSummary {
    let mut entries: Vec<_> = stats.slowlog.iter().collect();
    entries.sort_by(|a, b| b.duration_us.cmp(&a.duration_us));

    let mut lines = Vec::with_capacity(entries.len() + 1);
    lines.push(format!("Total: {} items", stats.slowlog_len));
    lines.extend(entries.into_iter().map(|entry| {
        format!(
            "{:.1}ms: {}",
            entry.duration_us as f64 / 1000.0,
            truncate_command(&entry.command.join(" "))
        )
    }));

    SlowlogSummary {
        total: stats.slowlog_len,
        lines,
    }
}

fn truncate_command(command: &str) -> String {
    if command.chars().count() <= MAX_COMMAND_LEN {
        return command.to_string();
    }
    let head: String = command.chars().take(MAX_COMMAND_LEN - 3).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionProvider;
    use crate::memory::MemoryStore;
    use crate::types::SlowlogEntry;

    fn filters() -> Vec<Regex> {
        BoardSettings::default().compile_detail_filters().unwrap()
    }

    fn slow(id: i64, duration_us: i64, command: &[&str]) -> SlowlogEntry {
        SlowlogEntry {
            id,
            timestamp: 1_700_000_000,
            duration_us,
            command: command.iter().map(|s| s.to_string()).collect(),
            client_addr: None,
            client_name: None,
        }
    }

    #[tokio::test]
    async fn test_collect_up() {
        let store = MemoryStore::new();
        store.set_string(0, "k", "v");
        let mut conn = store.connect().await.unwrap();

        let stats = collect(conn.as_mut(), &BoardSettings::default(), &filters()).await;
        assert_eq!(stats.status, ServerStatus::Up);
        assert_eq!(stats.memory, Metric::Known("1.00M (peak: 2.00M)".into()));
        assert_eq!(stats.clients, Metric::Known("1".into()));
        assert_eq!(stats.details["redis_version"], "7.2.4");
        assert!(stats.brief_details.contains_key("db0"));
        assert!(stats.brief_details.contains_key("uptime_in_seconds"));
        assert!(!stats.brief_details.contains_key("used_memory"));
    }

    #[tokio::test]
    async fn test_collect_rejected_command_is_error() {
        let store = MemoryStore::new();
        store.fail_command("SLOWLOG");
        let mut conn = store.connect().await.unwrap();

        let stats = collect(conn.as_mut(), &BoardSettings::default(), &filters()).await;
        match stats.status {
            ServerStatus::Error(msg) => assert!(msg.contains("SLOWLOG")),
            other => panic!("expected error status, got {other}"),
        }
        assert_eq!(stats.memory, Metric::NotAvailable);
    }

    #[tokio::test]
    async fn test_collect_dropped_connection_is_down() {
        let store = MemoryStore::new();
        let mut conn = store.connect().await.unwrap();
        store.set_down(true);

        let stats = collect(conn.as_mut(), &BoardSettings::default(), &filters()).await;
        assert_eq!(stats.status, ServerStatus::Down);
        assert!(stats.details.is_empty());
    }

    #[tokio::test]
    async fn test_slowlog_len_limits_fetch() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.push_slowlog(slow(i, 100 * i, &["GET", "k"]));
        }
        let mut conn = store.connect().await.unwrap();
        let settings = BoardSettings {
            slowlog_len: 2,
            ..Default::default()
        };

        let stats = collect(conn.as_mut(), &settings, &filters()).await;
        assert_eq!(stats.slowlog.len(), 2);
        assert_eq!(stats.slowlog_len, 5);
    }

    #[test]
    fn test_cpu_utilization() {
        let mut stats = ServerStats::unavailable(ServerStatus::Up);
        for (k, v) in [
            ("used_cpu_sys", "1.5"),
            ("used_cpu_sys_children", "0.25"),
            ("used_cpu_user", "2.0"),
            ("used_cpu_user_children", "0.25"),
            ("uptime_in_seconds", "1000"),
        ] {
            stats.details.insert(k.into(), v.into());
        }
        let cpu = cpu_utilization(&stats);
        let cpu = cpu.known().unwrap();
        assert_eq!(cpu.cpu_utilization, "0.004%");
        assert_eq!(cpu.used_cpu_user, 2.0);
    }

    #[test]
    fn test_cpu_utilization_zero_uptime() {
        let mut stats = ServerStats::unavailable(ServerStatus::Up);
        stats.details.insert("used_cpu_sys".into(), "3".into());
        stats.details.insert("uptime_in_seconds".into(), "0".into());
        assert_eq!(cpu_utilization(&stats).known().unwrap().cpu_utilization, "0.000%");
    }

    #[test]
    fn test_cpu_utilization_needs_up_server() {
        let stats = ServerStats::unavailable(ServerStatus::Down);
        assert_eq!(cpu_utilization(&stats), Metric::NotAvailable);
    }

    #[test]
    fn test_slowlog_summary_sorted_and_truncated() {
        let mut stats = ServerStats::unavailable(ServerStatus::Up);
        let long = "x".repeat(300);
        stats.slowlog = vec![
            slow(1, 1_500, &["GET", "a"]),
            slow(2, 12_340, &["SET", &long]),
            slow(3, 800, &["PING"]),
        ];
        stats.slowlog_len = 3;

        let summary = slowlog_summary(&stats);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.lines[0], "Total: 3 items");
        assert!(summary.lines[1].starts_with("12.3ms: SET xxx"));
        assert!(summary.lines[1].ends_with("..."));
        assert_eq!(summary.lines[1].len(), "12.3ms: ".len() + MAX_COMMAND_LEN);
        assert_eq!(summary.lines[2], "1.5ms: GET a");
        assert_eq!(summary.lines[3], "0.8ms: PING");
    }

    #[test]
    fn test_brief_details_filtering() {
        let mut details = BTreeMap::new();
        details.insert("redis_version".to_string(), "7".to_string());
        details.insert("used_memory".to_string(), "1".to_string());
        details.insert("db3".to_string(), "keys=1".to_string());
        let brief = brief_details(&details, &filters());
        assert_eq!(brief.len(), 2);
        assert!(brief.contains_key("db3"));
    }
}
