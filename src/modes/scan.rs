use tracing::{debug, instrument};

use crate::commands::{self, Scan};
use crate::connection::Connection;
use crate::modes::check_interrupt;
use crate::reply::{CommandKind, NodeId, ReplyTree, ReplyValue};
use crate::Result;

/// Iterates the whole keyspace with `SCAN`, optionally filtered by the configured pattern, and
/// appends one leaf per key. Any error aborts the pass; keys found so far stay in the tree.
#[instrument(name = "scan", skip_all)]
pub async fn scan(conn: &mut Connection, tree: &mut ReplyTree, parent: NodeId) -> Result<()> {
    let cmd = tree.add_command(parent, "SCAN", CommandKind::Inner);
    let interrupt = conn.interrupt().clone();
    let pattern = conn.config().pattern.clone();
    let mut cursor = 0;

    loop {
        check_interrupt(&interrupt)?;

        let page = commands::run(conn, &Scan::new(cursor).pattern(pattern.as_deref())).await?;
        debug!(cursor = page.cursor, keys = page.keys.len(), "SCAN page");
        for key in page.keys {
            tree.append(cmd, ReplyValue::Bulk(key));
        }

        cursor = page.cursor;
        if cursor == 0 {
            return Ok(());
        }
    }
}
