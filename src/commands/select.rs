use bytes::Bytes;

use crate::commands::{expect_ok, Command};
use crate::frame::Frame;
use crate::Result;

/// Select the Redis logical database having the specified zero-based numeric index.
///
/// Ref: <https://redis.io/docs/latest/commands/select>
#[derive(Debug, PartialEq)]
pub struct Select {
    pub index: i64,
}

impl Command for Select {
    type Output = ();

    fn argv(&self) -> Vec<Bytes> {
        vec![Bytes::from_static(b"SELECT"), self.index.to_string().into()]
    }

    fn parse_reply(frame: Frame) -> Result<()> {
        expect_ok(frame)
    }
}
