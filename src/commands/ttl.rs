use bytes::Bytes;

use crate::commands::{as_integer, Command, NO_TTL};
use crate::frame::Frame;
use crate::Result;

/// Returns the remaining time to live of a key that has a timeout.
///
/// Ref: <https://redis.io/docs/latest/commands/ttl>
#[derive(Debug, PartialEq)]
pub struct Ttl {
    pub key: Bytes,
}

impl Ttl {
    pub fn new(key: impl Into<Bytes>) -> Self {
        Self { key: key.into() }
    }

    /// Seconds to live, or [`NO_TTL`] for persistent and missing keys.
    pub fn seconds(frame: Frame) -> Result<i64> {
        let ttl = as_integer(frame)?;
        Ok(if ttl < 0 { NO_TTL } else { ttl })
    }
}

impl Command for Ttl {
    type Output = i64;

    fn argv(&self) -> Vec<Bytes> {
        vec![Bytes::from_static(b"TTL"), self.key.clone()]
    }

    fn parse_reply(frame: Frame) -> Result<i64> {
        Ttl::seconds(frame)
    }
}
