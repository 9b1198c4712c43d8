use std::io;
use std::path::Path;

use bytes::BytesMut;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use crate::connection::Connection;
use crate::modes::check_interrupt;
use crate::reply::{CommandKind, NodeId, ReplyTree, ReplyValue};
use crate::{Error, Result};

const CHUNK_SIZE: usize = 4096;

/// `rdb_path` value that keeps the dump in memory instead of writing it to a file.
pub const RDB_TO_MEMORY: &str = "-";

/// Sends a bare `SYNC` and reads the `$<len>` header of the bulk payload that follows.
///
/// The master may send newlines as keep-alives before the header, so leading `\n` bytes are
/// skipped. Returns the payload length.
async fn send_sync(conn: &mut Connection) -> Result<u64> {
    conn.write_raw(b"SYNC\r\n").await?;

    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = conn.read_raw(&mut byte).await?;
        if n == 0 {
            conn.disconnect();
            return Err(Error::Transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed while reading the SYNC reply",
            )));
        }
        if byte[0] == b'\n' {
            if line.is_empty() {
                continue;
            }
            break;
        }
        line.push(byte[0]);
    }

    let line = String::from_utf8_lossy(&line);
    let line = line.trim_end_matches('\r');
    debug!(header = line, "SYNC reply");

    if let Some(msg) = line.strip_prefix('-') {
        return Err(Error::Server(format!("SYNC with master failed: {msg}")));
    }

    line.strip_prefix('$')
        .and_then(|len| len.parse::<u64>().ok())
        .ok_or_else(|| Error::Protocol(format!("invalid SYNC reply header {line:?}")))
}

/// Destination of a transferred payload.
enum Sink<'a> {
    Discard,
    Memory(&'a mut BytesMut),
    File(&'a mut File),
}

impl Sink<'_> {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        match self {
            Sink::Discard => {}
            Sink::Memory(buf) => buf.extend_from_slice(chunk),
            Sink::File(file) => file.write_all(chunk).await?,
        }
        Ok(())
    }
}

/// Reads exactly `len` payload bytes and hands every chunk to `sink`. The interrupt flag is
/// checked once per chunk.
async fn transfer(conn: &mut Connection, len: u64, mut sink: Sink<'_>) -> Result<()> {
    let interrupt = conn.interrupt().clone();
    let mut remaining = len;
    let mut buf = vec![0u8; CHUNK_SIZE];

    while remaining > 0 {
        check_interrupt(&interrupt)?;

        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let n = conn.read_raw(&mut buf[..want]).await?;
        if n == 0 {
            conn.disconnect();
            return Err(Error::Transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("payload ended {remaining} bytes early"),
            )));
        }

        sink.write_chunk(&buf[..n]).await?;
        remaining -= n as u64;
    }

    Ok(())
}

/// Replication sync: performs the handshake, skips the RDB payload and then keeps reading the
/// replicated command stream into a `SYNC` node until interrupted.
#[instrument(name = "slave", skip_all)]
pub async fn slave(conn: &mut Connection, tree: &mut ReplyTree, parent: NodeId) -> Result<()> {
    let cmd = tree.add_command(parent, "SYNC", CommandKind::Inner);
    slave_into(conn, tree, cmd).await
}

pub(crate) async fn slave_into(
    conn: &mut Connection,
    tree: &mut ReplyTree,
    cmd: NodeId,
) -> Result<()> {
    let len = send_sync(conn).await?;
    info!("SYNC with master, discarding {} bytes of bulk transfer...", len);
    transfer(conn, len, Sink::Discard).await?;
    info!("SYNC done. Logging commands from master.");

    loop {
        let frame = conn.read_frame_interruptible().await?;
        conn.materialize(tree, cmd, frame)?;
    }
}

/// RDB transfer: performs the handshake and streams the payload to the configured path, or into
/// a bulk node when the path is [`RDB_TO_MEMORY`].
#[instrument(name = "rdb", skip_all)]
pub async fn rdb(conn: &mut Connection, tree: &mut ReplyTree, parent: NodeId) -> Result<()> {
    let cmd = tree.add_command(parent, "RDM", CommandKind::Inner);
    let path = conn
        .config()
        .rdb_path
        .clone()
        .ok_or_else(|| Error::Config("no RDB destination configured".to_string()))?;

    let len = send_sync(conn).await?;
    info!("SYNC sent to master, writing {} bytes to '{}'", len, path);

    if path == RDB_TO_MEMORY {
        let mut payload = BytesMut::with_capacity(len.min(1 << 20) as usize);
        transfer(conn, len, Sink::Memory(&mut payload)).await?;
        tree.append(cmd, ReplyValue::Bulk(payload.freeze()));
    } else {
        let mut file = create_dump(Path::new(&path)).await?;
        transfer(conn, len, Sink::File(&mut file)).await?;
        file.flush().await?;
    }

    info!("Transfer finished with success.");
    Ok(())
}

async fn create_dump(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)
        .await?;
    Ok(file)
}
