//! Runs user command lines against a connection and materializes their replies.
//!
//! A few verbs never reach the server: `help`/`?`, `connect host port` and `quit`/`exit`. The
//! streaming verbs (`monitor`, `subscribe`, `psubscribe`, `sync`, `psync`) keep the command node
//! open and read replies into it until the session is interrupted.

use bytes::Bytes;
use tracing::{debug, instrument, warn};

use crate::args::{join_args, split_args};
use crate::commands::{self, Select};
use crate::connection::Connection;
use crate::frame::Frame;
use crate::help;
use crate::modes::{pause, sync};
use crate::reply::{CommandKind, NodeId, ReplyTree, ReplyValue};
use crate::{Error, Result};

/// Text of the leaf appended for a command that could not be run.
pub const INVALID_ARGUMENTS: &str = "Invalid argument(s)";

/// Verbs that are refused inside a pipeline.
const ADMIN_VERBS: [&str; 11] = [
    "quit",
    "exit",
    "connect",
    "help",
    "?",
    "shutdown",
    "monitor",
    "subscribe",
    "psubscribe",
    "sync",
    "psync",
];

fn verb_of(argv: &[String]) -> String {
    argv.first().map(|v| v.to_lowercase()).unwrap_or_default()
}

fn invalid(tree: &mut ReplyTree, parent: NodeId, text: &str, kind: CommandKind) -> NodeId {
    let cmd = tree.add_command(parent, text, kind);
    tree.append(cmd, ReplyValue::Error(INVALID_ARGUMENTS.to_string()));
    cmd
}

/// Splits `line` and executes it as one command. Returns the command node.
pub async fn execute_one(
    conn: &mut Connection,
    tree: &mut ReplyTree,
    parent: NodeId,
    line: &str,
    kind: CommandKind,
) -> Result<NodeId> {
    match split_args(line) {
        Ok(argv) => execute_argv(conn, tree, parent, argv, kind).await,
        Err(e) => {
            debug!("Rejecting command line {:?}: {}", line, e);
            Ok(invalid(tree, parent, line, kind))
        }
    }
}

/// Executes one already split command below `parent`. Returns the command node.
#[instrument(skip_all, fields(command = %join_args(&argv)))]
pub async fn execute_argv(
    conn: &mut Connection,
    tree: &mut ReplyTree,
    parent: NodeId,
    argv: Vec<String>,
    kind: CommandKind,
) -> Result<NodeId> {
    if argv.is_empty() {
        return Err(Error::Argument("empty command".to_string()));
    }

    let verb = verb_of(&argv);
    let cmd = tree.add_command(parent, join_args(&argv), kind);

    match verb.as_str() {
        "help" | "?" => {
            tree.append(cmd, ReplyValue::Status(help::render(&argv[1..])));
            return Ok(cmd);
        }
        "quit" | "exit" => {
            conn.interrupt().interrupt();
            return Ok(cmd);
        }
        "connect" => {
            let target = match &argv[1..] {
                [host, port] => port.parse::<u16>().ok().map(|port| (host.clone(), port)),
                _ => None,
            };
            let Some((host, port)) = target else {
                tree.append(cmd, ReplyValue::Error(INVALID_ARGUMENTS.to_string()));
                return Ok(cmd);
            };
            conn.rebind(host, port);
            conn.connect(true).await?;
            return Ok(cmd);
        }
        _ => {}
    }

    if !conn.is_connected() {
        return Err(Error::NotConnected);
    }

    match verb.as_str() {
        "sync" | "psync" => {
            conn.flags_mut().slave = true;
            let result = sync::slave_into(conn, tree, cmd).await;
            conn.flags_mut().slave = false;
            result?;
            return Ok(cmd);
        }
        "monitor" => conn.flags_mut().monitor = true,
        "subscribe" | "psubscribe" => conn.flags_mut().pubsub = true,
        _ => {}
    }

    let outcome = request_into(conn, tree, cmd, &argv, kind).await?;
    let succeeded = outcome != Outcome::Failed;
    let auth_ok = outcome == Outcome::Ok;

    match verb.as_str() {
        "select" if succeeded => {
            if let Some(index) = argv.get(1).and_then(|i| i.parse::<i64>().ok()) {
                conn.set_db_index(index);
            }
        }
        "auth" => {
            conn.set_authenticated(auth_ok);
            let index = conn.config().db_index;
            if auth_ok && index != 0 {
                commands::run(conn, &Select { index }).await?;
            }
        }
        _ => {}
    }

    let flags = conn.flags();
    if flags.monitor || flags.pubsub {
        loop {
            let frame = conn.read_frame_interruptible().await?;
            conn.materialize(tree, cmd, frame)?;
        }
    }

    if let Some(interval) = conn.config().interval {
        let interrupt = conn.interrupt().clone();
        pause(&interrupt, interval).await;
    }

    Ok(cmd)
}

/// Executes a command whose arguments may not be valid UTF-8, such as a key operation on a name
/// returned by `SCAN`. None of the client side or streaming verbs apply here.
#[instrument(skip_all, fields(command = %join_args(&argv)))]
pub async fn execute_binary(
    conn: &mut Connection,
    tree: &mut ReplyTree,
    parent: NodeId,
    argv: Vec<Bytes>,
    kind: CommandKind,
) -> Result<NodeId> {
    if argv.is_empty() {
        return Err(Error::Argument("empty command".to_string()));
    }
    if !conn.is_connected() {
        return Err(Error::NotConnected);
    }

    let cmd = tree.add_command(parent, join_args(&argv), kind);
    request_into(conn, tree, cmd, &argv, kind).await?;
    Ok(cmd)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Ok,
    Replied,
    Failed,
}

/// Sends `argv`, materializes the reply under `cmd` and follows one MOVED/ASK redirect.
async fn request_into<A: AsRef<[u8]>>(
    conn: &mut Connection,
    tree: &mut ReplyTree,
    cmd: NodeId,
    argv: &[A],
    kind: CommandKind,
) -> Result<Outcome> {
    let mut frame = conn.request(argv, kind).await?;
    let mut outcome = outcome_of(&frame);
    conn.materialize(tree, cmd, frame)?;

    if conn.take_reissue() {
        debug!("Sending the command again to {}", conn.config().endpoint);
        conn.connect(true).await?;
        frame = conn.request(argv, kind).await?;
        outcome = outcome_of(&frame);
        conn.materialize(tree, cmd, frame)?;
        if conn.take_reissue() {
            warn!("Redirected twice in a row, giving up");
        }
    }

    Ok(outcome)
}

fn outcome_of(frame: &Frame) -> Outcome {
    match frame {
        Frame::Error(_) => Outcome::Failed,
        Frame::Simple(s) if s.eq_ignore_ascii_case("OK") => Outcome::Ok,
        _ => Outcome::Replied,
    }
}

/// Sends every command back to back, then reads exactly one reply per sent command into its own
/// command node. Administrative verbs and unparsable lines get an [`INVALID_ARGUMENTS`] leaf in
/// place of a reply and are not sent. Returns one node per input command, in input order.
#[instrument(skip_all, fields(commands = commands.len()))]
pub async fn execute_pipeline(
    conn: &mut Connection,
    tree: &mut ReplyTree,
    parent: NodeId,
    commands: &[(String, CommandKind)],
) -> Result<Vec<NodeId>> {
    if commands.is_empty() {
        return Err(Error::Argument("empty pipeline".to_string()));
    }

    let mut nodes = Vec::with_capacity(commands.len());
    let mut batch = Vec::with_capacity(commands.len());
    let mut pending = Vec::with_capacity(commands.len());

    for (line, kind) in commands {
        let argv = match split_args(line) {
            Ok(argv) if !argv.is_empty() => argv,
            _ => {
                nodes.push(invalid(tree, parent, line, *kind));
                continue;
            }
        };

        if ADMIN_VERBS.contains(&verb_of(&argv).as_str()) {
            debug!("Refusing {:?} inside a pipeline", line);
            nodes.push(invalid(tree, parent, line, *kind));
            continue;
        }

        let cmd = tree.add_command(parent, join_args(&argv), *kind);
        nodes.push(cmd);
        pending.push(cmd);
        batch.push((argv, *kind));
    }

    if batch.is_empty() {
        return Ok(nodes);
    }

    if !conn.is_connected() {
        return Err(Error::NotConnected);
    }

    conn.send_pipeline(&batch).await?;

    // Every reply is read before any is interpreted.
    let mut replies = Vec::with_capacity(pending.len());
    for _ in 0..pending.len() {
        replies.push(conn.read_frame().await?);
    }

    let mut failure = None;
    for (cmd, frame) in pending.into_iter().zip(replies) {
        if let Err(e) = conn.materialize(tree, cmd, frame) {
            warn!("Failed to read pipeline reply: {}", e);
            failure.get_or_insert(e);
        }
    }

    // Redirected pipelines are not replayed; the redirect node already tells where to go.
    if conn.take_reissue() {
        debug!("Ignoring redirect inside a pipeline");
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(nodes),
    }
}
