use bytes::Bytes;

use crate::commands::{Command, ReplyParser};
use crate::frame::Frame;
use crate::{Error, Result};

/// The SCAN command is used in order to incrementally iterate over the keys of a database.
///
/// Ref: <https://redis.io/docs/latest/commands/scan>
#[derive(Debug, PartialEq)]
pub struct Scan {
    pub cursor: u64,
    pub pattern: Option<String>,
    pub count: Option<u64>,
}

impl Scan {
    pub fn new(cursor: u64) -> Self {
        Self {
            cursor,
            pattern: None,
            count: None,
        }
    }

    pub fn pattern(mut self, pattern: Option<&str>) -> Self {
        self.pattern = pattern.map(String::from);
        self
    }

    pub fn count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }
}

/// One page of a SCAN pass. A zero `cursor` means the pass is complete.
///
/// Keys are kept as the raw bytes the server sent so they can be passed back verbatim.
#[derive(Debug, PartialEq, Eq)]
pub struct ScanPage {
    pub cursor: u64,
    pub keys: Vec<Bytes>,
}

impl Command for Scan {
    type Output = ScanPage;

    fn argv(&self) -> Vec<Bytes> {
        let mut argv = vec![Bytes::from_static(b"SCAN"), self.cursor.to_string().into()];
        if let Some(pattern) = &self.pattern {
            argv.extend([Bytes::from_static(b"MATCH"), pattern.clone().into()]);
        }
        if let Some(count) = self.count {
            argv.extend([Bytes::from_static(b"COUNT"), count.to_string().into()]);
        }
        argv
    }

    fn parse_reply(frame: Frame) -> Result<ScanPage> {
        let mut parser = ReplyParser::new(frame)?;
        if parser.remaining() != 2 {
            return Err(Error::Protocol(format!(
                "SCAN reply has {} elements, expected 2",
                parser.remaining()
            )));
        }

        let cursor = parser.next_string()?;
        let cursor = cursor
            .parse::<u64>()
            .map_err(|_| Error::Protocol(format!("invalid SCAN cursor {cursor:?}")))?;

        let mut keys_parser = ReplyParser::new(parser.next_frame()?)?;
        let mut keys = Vec::with_capacity(keys_parser.remaining());
        while keys_parser.remaining() > 0 {
            keys.push(keys_parser.next_bytes()?);
        }

        Ok(ScanPage { cursor, keys })
    }
}
