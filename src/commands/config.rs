use bytes::Bytes;

use crate::commands::{expect_ok, Command, ReplyParser};
use crate::frame::Frame;
use crate::Result;

/// Reads configuration parameters matching a glob pattern.
///
/// Ref: <https://redis.io/docs/latest/commands/config-get>
#[derive(Debug, PartialEq)]
pub struct ConfigGet {
    pub pattern: String,
}

impl ConfigGet {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl Command for ConfigGet {
    /// `(parameter, value)` pairs in reply order.
    type Output = Vec<(String, String)>;

    fn argv(&self) -> Vec<Bytes> {
        vec!["CONFIG".into(), "GET".into(), self.pattern.clone().into()]
    }

    fn parse_reply(frame: Frame) -> Result<Self::Output> {
        let mut parser = ReplyParser::new(frame)?;
        let mut pairs = Vec::with_capacity(parser.remaining() / 2);
        while parser.remaining() > 0 {
            let name = parser.next_string()?;
            let value = parser.next_string()?;
            pairs.push((name, value));
        }
        Ok(pairs)
    }
}

/// Reconfigures the server at run time.
///
/// Ref: <https://redis.io/docs/latest/commands/config-set>
#[derive(Debug, PartialEq)]
pub struct ConfigSet {
    pub parameter: String,
    pub value: String,
}

impl ConfigSet {
    pub fn new(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            value: value.into(),
        }
    }
}

impl Command for ConfigSet {
    type Output = ();

    fn argv(&self) -> Vec<Bytes> {
        vec![
            "CONFIG".into(),
            "SET".into(),
            self.parameter.clone().into(),
            self.value.clone().into(),
        ]
    }

    fn parse_reply(frame: Frame) -> Result<()> {
        expect_ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::Error;

    #[test]
    fn parse_pairs() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("databases")),
            Frame::Bulk(Bytes::from("16")),
            Frame::Bulk(Bytes::from("maxclients")),
            Frame::Bulk(Bytes::from("10000")),
        ]);

        let pairs = ConfigGet::parse_reply(frame).unwrap();

        assert_eq!(
            pairs,
            vec![
                ("databases".to_string(), "16".to_string()),
                ("maxclients".to_string(), "10000".to_string())
            ]
        );
    }

    #[test]
    fn odd_number_of_elements_is_a_protocol_error() {
        let frame = Frame::Array(vec![Frame::Bulk(Bytes::from("databases"))]);

        assert!(matches!(
            ConfigGet::parse_reply(frame),
            Err(Error::Protocol(_))
        ));
    }
}
