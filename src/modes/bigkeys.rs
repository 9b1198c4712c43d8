use std::str::FromStr;

use bytes::Bytes;
use tracing::{info, instrument, warn};

use crate::commands::{self, as_integer, Command, DbSize, KeyType, Scan, Size, Type};
use crate::connection::Connection;
use crate::frame::Frame;
use crate::modes::{check_interrupt, pause};
use crate::reply::{CommandKind, NodeId, ReplyTree, ReplyValue};
use crate::{Error, Result};

/// Types with a size query, in report order.
const REPORTED_TYPES: [KeyType; 5] = [
    KeyType::String,
    KeyType::List,
    KeyType::Set,
    KeyType::Hash,
    KeyType::ZSet,
];

/// Totals of one key type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSummary {
    pub count: u64,
    pub total_size: u64,
    /// Name and size of the largest key seen.
    pub biggest: Option<(String, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigKeysReport {
    pub sampled: u64,
    pub total_key_length: u64,
    summaries: [TypeSummary; 5],
}

impl Default for BigKeysReport {
    fn default() -> Self {
        Self {
            sampled: 0,
            total_key_length: 0,
            summaries: Default::default(),
        }
    }
}

impl BigKeysReport {
    pub fn summary(&self, key_type: KeyType) -> Option<&TypeSummary> {
        let index = REPORTED_TYPES.iter().position(|t| *t == key_type)?;
        Some(&self.summaries[index])
    }

    fn record(&mut self, key: impl AsRef<[u8]>, key_type: KeyType, size: u64) {
        let key = key.as_ref();
        let Some(index) = REPORTED_TYPES.iter().position(|t| *t == key_type) else {
            return;
        };
        let summary = &mut self.summaries[index];

        summary.count += 1;
        summary.total_size += size;
        self.total_key_length += key.len() as u64;
        self.sampled += 1;

        let current = summary.biggest.as_ref().map_or(0, |(_, size)| *size);
        if current < size {
            summary.biggest = Some((String::from_utf8_lossy(key).into_owned(), size));
        }
    }

    /// Summary lines: one per type that had a biggest key, then the totals of every type.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        for (key_type, summary) in REPORTED_TYPES.iter().zip(&self.summaries) {
            if let Some((key, size)) = &summary.biggest {
                lines.push(format!(
                    "Biggest {:>6} found '{}' has {} {}",
                    key_type.to_string(),
                    key,
                    size,
                    Size::unit(*key_type)
                ));
            }
        }

        for (key_type, summary) in REPORTED_TYPES.iter().zip(&self.summaries) {
            let pct = if self.sampled > 0 {
                100.0 * summary.count as f64 / self.sampled as f64
            } else {
                0.0
            };
            let avg = if summary.count > 0 {
                summary.total_size as f64 / summary.count as f64
            } else {
                0.0
            };
            lines.push(format!(
                "{} {}s with {} {} ({:05.2}% of keys, avg size {:.2})",
                summary.count,
                key_type,
                summary.total_size,
                Size::unit(*key_type),
                pct,
                avg
            ));
        }

        lines
    }
}

/// Scans the whole keyspace and reports, per type, the number of keys, their total size and the
/// biggest key. Sizes come from pipelined `TYPE` and size queries, one round trip each per page.
#[instrument(name = "bigkeys", skip_all)]
pub async fn big_keys(
    conn: &mut Connection,
    tree: &mut ReplyTree,
    parent: NodeId,
) -> Result<BigKeysReport> {
    let cmd = tree.add_command(parent, "FIND_BIG_KEYS", CommandKind::Inner);
    let interrupt = conn.interrupt().clone();
    let interval = conn.config().interval;

    let total_keys = commands::run(conn, &DbSize).await?;
    info!("Scanning the entire keyspace to find biggest keys as well as average sizes per key type");

    let mut report = BigKeysReport::default();
    let mut cursor = 0;

    loop {
        check_interrupt(&interrupt)?;

        let pct = if total_keys > 0 {
            100.0 * report.sampled as f64 / total_keys as f64
        } else {
            0.0
        };

        let page = commands::run(conn, &Scan::new(cursor)).await?;
        let types = key_types(conn, &page.keys).await?;
        let sizes = key_sizes(conn, &page.keys, &types).await?;

        for ((key, key_type), size) in page.keys.iter().zip(&types).zip(&sizes) {
            let (Some(key_type), Some(size)) = (key_type, size) else {
                continue;
            };
            let previous = report.summary(*key_type).and_then(|s| s.biggest.clone());
            report.record(key, *key_type, *size);
            if report.summary(*key_type).and_then(|s| s.biggest.clone()) != previous {
                info!(
                    "[{:05.2}%] Biggest {:<6} found so far '{}' with {} {}",
                    pct,
                    key_type.to_string(),
                    String::from_utf8_lossy(key),
                    size,
                    Size::unit(*key_type)
                );
            }
        }

        if let Some(interval) = interval {
            if report.sampled > 0 && report.sampled % 100 == 0 {
                pause(&interrupt, interval).await;
            }
        }

        cursor = page.cursor;
        if cursor == 0 {
            break;
        }
    }

    info!("Sampled {} keys in the keyspace!", report.sampled);
    info!(
        "Total key length in bytes is {} (avg len {:.2})",
        report.total_key_length,
        if report.sampled > 0 {
            report.total_key_length as f64 / report.sampled as f64
        } else {
            0.0
        }
    );

    for line in report.lines() {
        tree.append(cmd, ReplyValue::Status(line));
    }

    Ok(report)
}

/// Sends `commands` back to back and drains exactly one reply per command.
async fn pipeline(conn: &mut Connection, commands: Vec<Vec<Bytes>>) -> Result<Vec<Frame>> {
    if commands.is_empty() {
        return Ok(Vec::new());
    }

    let batch: Vec<_> = commands
        .into_iter()
        .map(|argv| (argv, CommandKind::Inner))
        .collect();
    conn.send_pipeline(&batch).await?;

    let mut replies = Vec::with_capacity(batch.len());
    for _ in 0..batch.len() {
        replies.push(conn.read_frame().await?);
    }
    Ok(replies)
}

/// Type of every key. `None` marks keys that vanished or have a type without a size query.
async fn key_types(conn: &mut Connection, keys: &[Bytes]) -> Result<Vec<Option<KeyType>>> {
    let queries = keys.iter().map(|k| Type::new(k.clone()).argv()).collect();
    let replies = pipeline(conn, queries).await?;

    keys.iter()
        .zip(replies)
        .map(|(key, reply)| (String::from_utf8_lossy(key), reply))
        .map(|(key, reply)| match reply {
            Frame::Simple(name) => match KeyType::from_str(&name) {
                Ok(KeyType::Missing) => Ok(None),
                Ok(key_type) if Size::verb(key_type).is_some() => Ok(Some(key_type)),
                _ => {
                    warn!("Skipping key '{}' of unsupported type '{}'", key, name);
                    Ok(None)
                }
            },
            Frame::Error(msg) => Err(Error::Server(msg)),
            other => Err(Error::Protocol(format!(
                "invalid reply {other} for TYPE on key '{key}'"
            ))),
        })
        .collect()
}

/// Size of every typed key. A key that changed type or disappeared since `TYPE` counts as 0.
async fn key_sizes(
    conn: &mut Connection,
    keys: &[Bytes],
    types: &[Option<KeyType>],
) -> Result<Vec<Option<u64>>> {
    let queries: Vec<Option<Size>> = keys
        .iter()
        .zip(types)
        .map(|(key, key_type)| key_type.and_then(|t| Size::new(key.clone(), t)))
        .collect();

    let replies = pipeline(conn, queries.iter().flatten().map(|q| q.argv()).collect()).await?;
    let mut replies = replies.into_iter();

    let mut sizes = Vec::with_capacity(queries.len());
    for query in &queries {
        let Some(query) = query else {
            sizes.push(None);
            continue;
        };
        let reply = replies
            .next()
            .ok_or_else(|| Error::Protocol("missing size reply".to_string()))?;
        let size = match as_integer(reply) {
            Ok(size) => size.max(0) as u64,
            Err(_) => {
                warn!(
                    "{} on '{}' failed (may have changed type)",
                    Size::verb(query.key_type).unwrap_or("SIZE"),
                    String::from_utf8_lossy(&query.key)
                );
                0
            }
        };
        sizes.push(Some(size));
    }

    Ok(sizes)
}
