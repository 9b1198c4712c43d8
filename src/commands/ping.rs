use bytes::Bytes;

use crate::commands::Command;
use crate::frame::Frame;
use crate::{Error, Result};

/// Returns PONG. Used to measure round trip latency.
///
/// Ref: <https://redis.io/docs/latest/commands/ping>
#[derive(Debug, PartialEq)]
pub struct Ping;

impl Command for Ping {
    type Output = ();

    fn argv(&self) -> Vec<Bytes> {
        vec![Bytes::from_static(b"PING")]
    }

    fn parse_reply(frame: Frame) -> Result<()> {
        match frame {
            Frame::Simple(_) | Frame::Bulk(_) => Ok(()),
            frame => Err(Error::Protocol(format!("unexpected PING reply {frame}"))),
        }
    }
}
