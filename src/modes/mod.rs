//! Long running protocol modes. Each one runs under its own command node, checks the interrupt
//! flag once per iteration and never retries on its own.

pub mod bigkeys;
pub mod latency;
pub mod scan;
pub mod stat;
pub mod sync;

use std::time::Duration;

use crate::connection::Connection;
use crate::interrupt::Interrupt;
use crate::reply::{NodeId, ReplyTree};
use crate::{Error, Result};

pub use crate::config::Mode;
pub use bigkeys::{big_keys, BigKeysReport, TypeSummary};
pub use latency::latency;
pub use scan::scan;
pub use stat::stat;
pub use sync::{rdb, slave};

/// Runs one mode below `parent`.
pub async fn run(
    conn: &mut Connection,
    tree: &mut ReplyTree,
    parent: NodeId,
    mode: Mode,
) -> Result<()> {
    match mode {
        Mode::Latency => latency(conn, tree, parent).await,
        Mode::Slave => slave(conn, tree, parent).await,
        Mode::Rdb => rdb(conn, tree, parent).await,
        Mode::BigKeys => big_keys(conn, tree, parent).await.map(|_| ()),
        Mode::Stat => stat(conn, tree, parent).await,
        Mode::Scan => scan(conn, tree, parent).await,
    }
}

pub(crate) fn check_interrupt(interrupt: &Interrupt) -> Result<()> {
    if interrupt.is_interrupted() {
        return Err(Error::Interrupted);
    }
    Ok(())
}

/// Sleeps for `duration`, waking early when interrupted. The flag itself is left for the next
/// iteration check.
pub(crate) async fn pause(interrupt: &Interrupt, duration: Duration) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = interrupt.interrupted() => {}
    }
}
