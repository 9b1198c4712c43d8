//! Typed commands the driver issues on its own behalf, with the parsing of their replies.

pub mod cluster;
pub mod config;
pub mod dbsize;
pub mod info;
pub mod key;
pub mod ping;
pub mod save;
pub mod scan;
pub mod select;
pub mod shutdown;
pub mod size;
pub mod ttl;
pub mod type_;

use bytes::Bytes;
use std::{str, vec};
use thiserror::Error as ThisError;

use crate::connection::Connection;
use crate::frame::Frame;
use crate::materialize::is_auth_lost;
use crate::reply::CommandKind;
use crate::{Error, Result};

pub use cluster::ClusterNodes;
pub use config::{ConfigGet, ConfigSet};
pub use dbsize::DbSize;
pub use info::Info;
pub use key::{CommandKey, KeyOp, KeyType, KeyValue, NKey, NO_TTL};
pub use ping::Ping;
pub use save::Save;
pub use scan::{Scan, ScanPage};
pub use select::Select;
pub use shutdown::Shutdown;
pub use size::Size;
pub use ttl::Ttl;
pub use type_::Type;

type ParseResult<T> = std::result::Result<T, ReplyParserError>;

/// A request with a known reply shape.
pub trait Command {
    type Output;

    /// Arguments as sent on the wire. Keys stay binary safe.
    fn argv(&self) -> Vec<Bytes>;

    /// Converts a non-error reply into the typed output.
    fn parse_reply(frame: Frame) -> Result<Self::Output>;
}

/// Sends `cmd` as an inner command and parses its reply. An error reply becomes
/// [`Error::Server`] and, when it says so, clears the authenticated flag.
pub async fn run<C: Command>(conn: &mut Connection, cmd: &C) -> Result<C::Output> {
    let frame = conn.request(&cmd.argv(), CommandKind::Inner).await?;
    C::parse_reply(check_error(conn, frame)?)
}

pub(crate) fn check_error(conn: &mut Connection, frame: Frame) -> Result<Frame> {
    match frame {
        Frame::Error(msg) => {
            if is_auth_lost(&msg) {
                conn.set_authenticated(false);
            }
            Err(Error::Server(msg))
        }
        frame => Ok(frame),
    }
}

/// Walks the elements of an array reply.
pub(crate) struct ReplyParser {
    parts: vec::IntoIter<Frame>,
}

impl ReplyParser {
    pub(crate) fn new(frame: Frame) -> ParseResult<Self> {
        match frame {
            Frame::Array(parts) => Ok(Self {
                parts: parts.into_iter(),
            }),
            frame => Err(ReplyParserError::InvalidFrame {
                expected: "array".to_string(),
                actual: frame,
            }),
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.parts.len()
    }

    pub(crate) fn next_frame(&mut self) -> ParseResult<Frame> {
        self.parts.next().ok_or(ReplyParserError::EndOfStream)
    }

    pub(crate) fn next_string(&mut self) -> ParseResult<String> {
        as_string(self.next_frame()?)
    }

    pub(crate) fn next_integer(&mut self) -> ParseResult<i64> {
        as_integer(self.next_frame()?)
    }

    pub(crate) fn next_bytes(&mut self) -> ParseResult<Bytes> {
        match self.next_frame()? {
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(ReplyParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }
}

pub(crate) fn as_string(frame: Frame) -> ParseResult<String> {
    match frame {
        // Both `Simple` and `Bulk` representation may be strings. Strings are parsed to UTF-8.
        // While errors are stored as strings, they are considered separate types.
        Frame::Simple(s) => Ok(s),
        Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
            .map(|s| s.to_string())
            .map_err(ReplyParserError::InvalidUTF8String),
        frame => Err(ReplyParserError::InvalidFrame {
            expected: "simple or bulk string".to_string(),
            actual: frame,
        }),
    }
}

pub(crate) fn as_integer(frame: Frame) -> ParseResult<i64> {
    match frame {
        Frame::Integer(i) => Ok(i),
        Frame::Simple(string) => {
            string
                .parse::<i64>()
                .map_err(|_| ReplyParserError::InvalidFrame {
                    expected: "parseable i64 frame".to_string(),
                    actual: Frame::Simple(string),
                })
        }
        Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
            .map_err(ReplyParserError::InvalidUTF8String)?
            .parse::<i64>()
            .map_err(|_| ReplyParserError::InvalidFrame {
                expected: "parseable i64 frame".to_string(),
                actual: Frame::Bulk(bytes),
            }),
        frame => Err(ReplyParserError::InvalidFrame {
            expected: "integer".to_string(),
            actual: frame,
        }),
    }
}

pub(crate) fn expect_ok(frame: Frame) -> Result<()> {
    match frame {
        Frame::Simple(s) if s.eq_ignore_ascii_case("OK") => Ok(()),
        frame => Err(ReplyParserError::InvalidFrame {
            expected: "OK".to_string(),
            actual: frame,
        }
        .into()),
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum ReplyParserError {
    #[error("invalid reply, expected {expected}, got {actual}")]
    InvalidFrame { expected: String, actual: Frame },
    #[error("invalid UTF-8 string in reply")]
    InvalidUTF8String(#[from] str::Utf8Error),
    #[error("attempting to extract a value failed due to the reply being fully consumed")]
    EndOfStream,
}

impl From<ReplyParserError> for Error {
    fn from(err: ReplyParserError) -> Self {
        Error::Protocol(err.to_string())
    }
}
