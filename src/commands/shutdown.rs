use bytes::Bytes;

use crate::commands::Command;
use crate::frame::Frame;
use crate::{Error, Result};

/// Stops all clients, saves and quits the server. A successful shutdown has no reply, the
/// server just closes the connection.
///
/// Ref: <https://redis.io/docs/latest/commands/shutdown>
#[derive(Debug, PartialEq)]
pub struct Shutdown;

impl Command for Shutdown {
    type Output = ();

    fn argv(&self) -> Vec<Bytes> {
        vec![Bytes::from_static(b"SHUTDOWN")]
    }

    fn parse_reply(frame: Frame) -> Result<()> {
        Err(Error::Protocol(format!("unexpected SHUTDOWN reply {frame}")))
    }
}
