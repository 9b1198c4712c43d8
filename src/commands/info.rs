use bytes::Bytes;

use crate::commands::{as_string, Command};
use crate::frame::Frame;
use crate::Result;

/// The INFO command returns information and statistics about the server.
///
/// Ref: <https://redis.io/docs/latest/commands/info>
#[derive(Debug, PartialEq, Default)]
pub struct Info {
    pub section: Option<String>,
}

impl Command for Info {
    type Output = String;

    fn argv(&self) -> Vec<Bytes> {
        let mut argv = vec![Bytes::from_static(b"INFO")];
        argv.extend(self.section.clone().map(Bytes::from));
        argv
    }

    fn parse_reply(frame: Frame) -> Result<String> {
        Ok(as_string(frame)?)
    }
}
