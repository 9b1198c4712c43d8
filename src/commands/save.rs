use bytes::Bytes;

use crate::commands::{expect_ok, Command};
use crate::frame::Frame;
use crate::Result;

/// Synchronously save the dataset to disk.
///
/// Ref: <https://redis.io/docs/latest/commands/save>
#[derive(Debug, PartialEq)]
pub struct Save;

impl Command for Save {
    type Output = ();

    fn argv(&self) -> Vec<Bytes> {
        vec![Bytes::from_static(b"SAVE")]
    }

    fn parse_reply(frame: Frame) -> Result<()> {
        expect_ok(frame)
    }
}
