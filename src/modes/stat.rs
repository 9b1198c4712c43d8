use std::time::Duration;

use tracing::instrument;

use crate::commands::{self, Info};
use crate::connection::Connection;
use crate::modes::{check_interrupt, pause};
use crate::reply::{CommandKind, NodeId, ReplyTree, ReplyValue};
use crate::server_info::info_field;
use crate::Result;

const STAT_DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const STAT_DATABASES: u32 = 20;
const NOT_FOUND: &str = "not found";

/// Polls `INFO` and appends one summary line per sample until interrupted.
#[instrument(name = "stat", skip_all)]
pub async fn stat(conn: &mut Connection, tree: &mut ReplyTree, parent: NodeId) -> Result<()> {
    let cmd = tree.add_command(parent, "INFO", CommandKind::Inner);
    let interrupt = conn.interrupt().clone();
    let interval = conn.config().interval.unwrap_or(STAT_DEFAULT_INTERVAL);
    let mut requests = None;

    loop {
        check_interrupt(&interrupt)?;

        let info = commands::run(conn, &Info::default()).await?;
        tree.append(cmd, ReplyValue::Status(stat_line(&info, &mut requests)));

        pause(&interrupt, interval).await;
    }
}

fn long_field(info: &str, name: &str) -> Option<i64> {
    info_field(info, name)?.trim().parse().ok()
}

/// Formats one sample. `requests` carries the processed command count of the previous sample.
pub(crate) fn stat_line(info: &str, requests: &mut Option<i64>) -> String {
    let keys: u64 = (0..STAT_DATABASES)
        .filter_map(|db| info_field(info, &format!("db{db}")))
        .filter_map(|value| {
            value
                .split(',')
                .find_map(|pair| pair.strip_prefix("keys="))
                .and_then(|keys| keys.parse::<u64>().ok())
        })
        .sum();

    let mut line = format!("keys {keys}");

    let used_memory = long_field(info, "used_memory")
        .map(bytes_to_human)
        .unwrap_or_else(|| NOT_FOUND.to_string());
    line.push_str(&format!(" used_memory: {used_memory}"));

    for name in ["connected_clients", "blocked_clients"] {
        line.push_str(&format!(" {name}: {}", or_not_found(long_field(info, name))));
    }

    match long_field(info, "total_commands_processed") {
        Some(total) => {
            let delta = requests.map(|previous| total - previous).unwrap_or(0);
            line.push_str(&format!(" total_commands_processed: {total} (+{delta})"));
            *requests = Some(total);
        }
        None => line.push_str(&format!(" total_commands_processed: {NOT_FOUND}")),
    }

    line.push_str(&format!(
        " total_connections_received: {}",
        or_not_found(long_field(info, "total_connections_received"))
    ));

    let bgsave = long_field(info, "rdb_bgsave_in_progress")
        .or_else(|| long_field(info, "bgsave_in_progress"))
        .unwrap_or(0);
    let aof = long_field(info, "aof_rewrite_in_progress").unwrap_or(0);
    match (bgsave != 0, aof != 0) {
        (true, false) => line.push_str(" SAVE"),
        (false, true) => line.push_str(" AOF"),
        (true, true) => line.push_str(" SAVE+AOF"),
        (false, false) => {}
    }

    line
}

fn or_not_found(value: Option<i64>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| NOT_FOUND.to_string())
}

/// Human readable byte count: `100B`, `4.00K`, `2.50M`, `1.00G`.
pub(crate) fn bytes_to_human(n: i64) -> String {
    let sign = if n < 0 { "-" } else { "" };
    let n = n.unsigned_abs();
    let d = n as f64;

    if n < 1024 {
        format!("{sign}{n}B")
    } else if n < 1024 * 1024 {
        format!("{sign}{:.2}K", d / 1024.0)
    } else if n < 1024 * 1024 * 1024 {
        format!("{sign}{:.2}M", d / (1024.0 * 1024.0))
    } else {
        format!("{sign}{:.2}G", d / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = "# Clients\r\nconnected_clients:2\r\nblocked_clients:0\r\n# Memory\r\nused_memory:1572864\r\n# Persistence\r\nrdb_bgsave_in_progress:1\r\naof_rewrite_in_progress:1\r\n# Stats\r\ntotal_connections_received:7\r\ntotal_commands_processed:100\r\n# Keyspace\r\ndb0:keys=5,expires=0,avg_ttl=0\r\ndb2:keys=3,expires=1,avg_ttl=10\r\n";

    #[test]
    fn human_sizes() {
        assert_eq!(bytes_to_human(100), "100B");
        assert_eq!(bytes_to_human(4096), "4.00K");
        assert_eq!(bytes_to_human(1572864), "1.50M");
        assert_eq!(bytes_to_human(2 * 1024 * 1024 * 1024), "2.00G");
        assert_eq!(bytes_to_human(-2048), "-2.00K");
    }

    #[test]
    fn sample_line_with_delta() {
        let mut requests = None;

        let first = stat_line(INFO, &mut requests);
        assert_eq!(
            first,
            "keys 8 used_memory: 1.50M connected_clients: 2 blocked_clients: 0 \
             total_commands_processed: 100 (+0) total_connections_received: 7 SAVE+AOF"
        );

        let next = INFO.replace("total_commands_processed:100", "total_commands_processed:130");
        let second = stat_line(&next, &mut requests);
        assert!(second.contains("total_commands_processed: 130 (+30)"));
    }

    #[test]
    fn missing_fields_are_not_found() {
        let mut requests = None;

        let line = stat_line("# Server\r\nredis_version:7.0.0\r\n", &mut requests);

        assert_eq!(
            line,
            "keys 0 used_memory: not found connected_clients: not found blocked_clients: not found \
             total_commands_processed: not found total_connections_received: not found"
        );
        assert_eq!(requests, None);
    }
}
