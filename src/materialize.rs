//! Conversion of wire replies into reply tree nodes.

use crate::frame::Frame;
use crate::reply::{NodeId, ReplyTree, ReplyValue};
use crate::{Error, Result};

/// Substrings of an error reply meaning the session is no longer authenticated.
const AUTH_LOST_MARKERS: [&str; 3] = ["noauth", "wrongpass", "invalid password"];

/// A cluster redirection extracted from a `MOVED` or `ASK` error reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub slot: u16,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    Moved,
    Ask,
}

impl Redirect {
    /// Whether `msg` is a redirection at all. The text may still be malformed.
    pub fn is_redirect(msg: &str) -> bool {
        msg.starts_with("MOVED") || msg == "ASK" || msg.starts_with("ASK ")
    }

    /// Parses `MOVED <slot> <host>:<port>` (or the `ASK` equivalent). Host and port are split on
    /// the last colon so IPv6 addresses survive.
    pub fn parse(msg: &str) -> Result<Self> {
        let malformed = || Error::Protocol(format!("malformed redirect {msg:?}"));

        let mut tokens = msg.split(' ');
        let kind = match tokens.next() {
            Some(word) if word.starts_with("MOVED") => RedirectKind::Moved,
            Some("ASK") => RedirectKind::Ask,
            _ => return Err(malformed()),
        };
        let slot = tokens
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(malformed)?;
        let (host, port) = tokens
            .next()
            .and_then(|addr| addr.rsplit_once(':'))
            .ok_or_else(malformed)?;
        let port = port.parse::<u16>().map_err(|_| malformed())?;
        if host.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            kind,
            slot,
            host: host.to_string(),
            port,
        })
    }
}

/// Side effects of one reply on the connection state, applied by the connection.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Effects {
    pub auth_lost: bool,
    pub redirect: Option<Redirect>,
}

/// Appends the tree equivalent of `frame` below `parent`.
///
/// In cluster mode a top level `MOVED`/`ASK` error is replaced by a status node describing the
/// redirection and reported through [`Effects::redirect`]. A malformed redirection is a protocol
/// error.
pub fn materialize(
    tree: &mut ReplyTree,
    parent: NodeId,
    frame: Frame,
    cluster_mode: bool,
) -> Result<Effects> {
    let mut effects = Effects::default();

    if cluster_mode {
        if let Frame::Error(msg) = &frame {
            if Redirect::is_redirect(msg) {
                let redirect = Redirect::parse(msg)?;
                tree.append(
                    parent,
                    ReplyValue::Status(format!(
                        "-> Redirected to slot [{}] located at {}:{}",
                        redirect.slot, redirect.host, redirect.port
                    )),
                );
                effects.redirect = Some(redirect);
                return Ok(effects);
            }
        }
    }

    append_frame(tree, parent, frame, &mut effects);
    Ok(effects)
}

fn append_frame(tree: &mut ReplyTree, parent: NodeId, frame: Frame, effects: &mut Effects) {
    match frame {
        Frame::Array(frames) => {
            let array = tree.append(parent, ReplyValue::Array);
            for frame in frames {
                append_frame(tree, array, frame, effects);
            }
        }
        Frame::Error(msg) => {
            if is_auth_lost(&msg) {
                effects.auth_lost = true;
            }
            tree.append(parent, ReplyValue::Error(msg));
        }
        Frame::Simple(s) => {
            tree.append(parent, ReplyValue::Status(s));
        }
        Frame::Bulk(bytes) => {
            tree.append(parent, ReplyValue::Bulk(bytes));
        }
        Frame::Integer(i) => {
            tree.append(parent, ReplyValue::Integer(i));
        }
        Frame::Null => {
            tree.append(parent, ReplyValue::Null);
        }
        Frame::Unknown(tag) => {
            tree.append(
                parent,
                ReplyValue::Error(format!("unknown reply type: {}", tag as char)),
            );
        }
    }
}

pub(crate) fn is_auth_lost(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    AUTH_LOST_MARKERS.iter().any(|marker| msg.contains(marker))
}
