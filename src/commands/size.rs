use bytes::Bytes;

use crate::commands::{as_integer, Command, KeyType};
use crate::frame::Frame;
use crate::{Error, Result};

/// The size query matching a key's type: string length, or the element count of a container.
#[derive(Debug, PartialEq)]
pub struct Size {
    pub key: Bytes,
    pub key_type: KeyType,
}

impl Size {
    /// `None` for types that have no size query.
    pub fn new(key: impl Into<Bytes>, key_type: KeyType) -> Option<Self> {
        Self::verb(key_type)?;
        Some(Self {
            key: key.into(),
            key_type,
        })
    }

    pub fn verb(key_type: KeyType) -> Option<&'static str> {
        match key_type {
            KeyType::String => Some("STRLEN"),
            KeyType::List => Some("LLEN"),
            KeyType::Set => Some("SCARD"),
            KeyType::Hash => Some("HLEN"),
            KeyType::ZSet => Some("ZCARD"),
            KeyType::Stream | KeyType::Missing => None,
        }
    }

    /// What the size of a key of this type counts.
    pub fn unit(key_type: KeyType) -> &'static str {
        match key_type {
            KeyType::String => "bytes",
            KeyType::List => "items",
            KeyType::Hash => "fields",
            _ => "members",
        }
    }
}

impl Command for Size {
    type Output = u64;

    fn argv(&self) -> Vec<Bytes> {
        let verb = Self::verb(self.key_type).unwrap_or("STRLEN");
        vec![Bytes::from_static(verb.as_bytes()), self.key.clone()]
    }

    fn parse_reply(frame: Frame) -> Result<u64> {
        let size = as_integer(frame)?;
        u64::try_from(size).map_err(|_| Error::Protocol(format!("negative size {size}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_per_type() {
        let size = Size::new("k", KeyType::ZSet).unwrap();

        assert_eq!(size.argv(), vec!["ZCARD", "k"]);
        assert!(Size::new("k", KeyType::Stream).is_none());
        assert_eq!(Size::unit(KeyType::List), "items");
    }
}
