use std::fmt;
use std::time::{Duration, Instant};

use tracing::instrument;

use crate::commands::{self, Ping};
use crate::connection::Connection;
use crate::modes::{check_interrupt, pause};
use crate::reply::{CommandKind, NodeId, ReplyTree, ReplyValue};
use crate::Result;

const LATENCY_SAMPLE_RATE: Duration = Duration::from_millis(10);
const LATENCY_HISTORY_DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct LatencyStats {
    min: u64,
    max: u64,
    total: u64,
    count: u64,
}

impl LatencyStats {
    pub(crate) fn record(&mut self, latency: u64) {
        if self.count == 0 {
            self.min = latency;
            self.max = latency;
        } else {
            self.min = self.min.min(latency);
            self.max = self.max.max(latency);
        }
        self.total += latency;
        self.count += 1;
    }

    fn avg(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total as f64 / self.count as f64
    }
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min: {}, max: {}, avg: {:.2} ({} samples)",
            self.min,
            self.max,
            self.avg(),
            self.count
        )
    }
}

/// Pings the server in a loop, keeping min/max/avg round trip time in milliseconds.
///
/// The summary node is updated in place. With latency history enabled a new node is started
/// every window. Only ever returns an error, [`crate::Error::Interrupted`] being the normal exit.
#[instrument(name = "latency", skip_all)]
pub async fn latency(conn: &mut Connection, tree: &mut ReplyTree, parent: NodeId) -> Result<()> {
    let cmd = tree.add_command(parent, "PING", CommandKind::Inner);
    let interrupt = conn.interrupt().clone();
    let history = conn.config().latency_history;
    let window = conn
        .config()
        .interval
        .unwrap_or(LATENCY_HISTORY_DEFAULT_INTERVAL);

    let mut stats = LatencyStats::default();
    let mut node: Option<NodeId> = None;
    let mut history_start = Instant::now();

    loop {
        check_interrupt(&interrupt)?;

        let start = Instant::now();
        commands::run(conn, &Ping).await?;
        stats.record(start.elapsed().as_millis() as u64);

        let value = ReplyValue::Status(stats.to_string());
        match node {
            Some(id) => tree.set_value(id, value),
            None => node = Some(tree.append(cmd, value)),
        }

        if history && history_start.elapsed() > window {
            // Keep the finished window and start a fresh one.
            node = None;
            stats = LatencyStats::default();
            history_start = Instant::now();
        }

        pause(&interrupt, LATENCY_SAMPLE_RATE).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_min_max_avg() {
        let mut stats = LatencyStats::default();
        for latency in [3, 1, 2, 6] {
            stats.record(latency);
        }

        assert_eq!(stats.to_string(), "min: 1, max: 6, avg: 3.00 (4 samples)");
    }
}
