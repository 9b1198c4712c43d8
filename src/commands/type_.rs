use bytes::Bytes;
use std::str::FromStr;

use crate::commands::{as_string, Command, KeyType};
use crate::frame::Frame;
use crate::{Error, Result};

/// Returns the string representation of the type of the value stored at key.
///
/// Ref: <https://redis.io/docs/latest/commands/type>
#[derive(Debug, PartialEq)]
pub struct Type {
    pub key: Bytes,
}

impl Type {
    pub fn new(key: impl Into<Bytes>) -> Self {
        Self { key: key.into() }
    }

    /// Interprets a `TYPE` reply. Types this driver does not know are a protocol error.
    pub fn key_type(frame: Frame) -> Result<KeyType> {
        let name = as_string(frame)?;
        KeyType::from_str(&name).map_err(|_| Error::Protocol(format!("unknown key type {name:?}")))
    }
}

impl Command for Type {
    type Output = KeyType;

    fn argv(&self) -> Vec<Bytes> {
        vec![Bytes::from_static(b"TYPE"), self.key.clone()]
    }

    fn parse_reply(frame: Frame) -> Result<KeyType> {
        Type::key_type(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_type_reply() {
        let key_type = Type::parse_reply(Frame::Simple("list".to_string())).unwrap();

        assert_eq!(key_type, KeyType::List);
    }

    #[test]
    fn binary_key_is_sent_verbatim() {
        let key = Bytes::from_static(b"\x00k\xff");

        assert_eq!(Type::new(key.clone()).argv(), vec![Bytes::from("TYPE"), key]);
    }
}
