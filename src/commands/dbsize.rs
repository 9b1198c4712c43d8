use bytes::Bytes;

use crate::commands::{as_integer, Command};
use crate::frame::Frame;
use crate::Result;

/// Return the number of keys in the currently-selected database.
///
/// Ref: <https://redis.io/docs/latest/commands/dbsize>
#[derive(Debug, PartialEq)]
pub struct DbSize;

impl Command for DbSize {
    type Output = u64;

    fn argv(&self) -> Vec<Bytes> {
        vec![Bytes::from_static(b"DBSIZE")]
    }

    fn parse_reply(frame: Frame) -> Result<u64> {
        Ok(as_integer(frame)?.max(0) as u64)
    }
}
