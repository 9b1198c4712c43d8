use bytes::Bytes;
use std::fmt;

use strum_macros::{Display, EnumString};

/// TTL of a key that never expires. Both "no expiry" (-1) and "no such key" (-2) replies of
/// `TTL` map to it.
pub const NO_TTL: i64 = -1;

/// Value type of a key, as reported by `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum KeyType {
    String,
    List,
    Set,
    ZSet,
    Hash,
    Stream,
    /// The key does not exist (anymore).
    #[strum(serialize = "none")]
    Missing,
}

/// Key metadata shown in database content listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NKey {
    /// Raw key name as stored on the server.
    pub name: Bytes,
    pub key_type: KeyType,
    pub ttl: i64,
}

impl NKey {
    pub fn new(name: impl Into<Bytes>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            key_type,
            ttl: NO_TTL,
        }
    }
}

/// A value to store under a key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    String(String),
    List(Vec<String>),
    Set(Vec<String>),
    /// `(member, score)` pairs.
    ZSet(Vec<(String, f64)>),
    /// `(field, value)` pairs.
    Hash(Vec<(String, String)>),
}

impl KeyValue {
    pub fn key_type(&self) -> KeyType {
        match self {
            KeyValue::String(_) => KeyType::String,
            KeyValue::List(_) => KeyType::List,
            KeyValue::Set(_) => KeyType::Set,
            KeyValue::ZSet(_) => KeyType::ZSet,
            KeyValue::Hash(_) => KeyType::Hash,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyOp {
    Delete,
    Load,
    Create(KeyValue),
    ChangeTtl(i64),
}

/// A key level operation, rendered into a concrete command for the key's value type.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandKey {
    pub key: NKey,
    pub op: KeyOp,
}

impl CommandKey {
    pub fn new(key: NKey, op: KeyOp) -> Self {
        Self { key, op }
    }

    /// Arguments of the concrete command. The key name is passed through untouched.
    pub fn argv(&self) -> Vec<Bytes> {
        let name = self.key.name.clone();
        let word = Bytes::from_static;

        match &self.op {
            KeyOp::Delete => vec![word(b"DEL"), name],
            KeyOp::Load => match self.key.key_type {
                KeyType::List => vec![word(b"LRANGE"), name, word(b"0"), word(b"-1")],
                KeyType::Set => vec![word(b"SMEMBERS"), name],
                KeyType::ZSet => vec![word(b"ZRANGE"), name, word(b"0"), word(b"-1")],
                KeyType::Hash => vec![word(b"HGETALL"), name],
                _ => vec![word(b"GET"), name],
            },
            KeyOp::Create(value) => {
                let verb = match value {
                    KeyValue::List(_) => "LPUSH",
                    KeyValue::Set(_) => "SADD",
                    KeyValue::ZSet(_) => "ZADD",
                    KeyValue::Hash(_) => "HMSET",
                    KeyValue::String(_) => "SET",
                };
                let mut argv = vec![word(verb.as_bytes()), name];
                match value {
                    KeyValue::String(s) => argv.push(s.clone().into()),
                    KeyValue::List(items) | KeyValue::Set(items) => {
                        argv.extend(items.iter().cloned().map(Bytes::from))
                    }
                    KeyValue::ZSet(members) => {
                        for (member, score) in members {
                            argv.push(score.to_string().into());
                            argv.push(member.clone().into());
                        }
                    }
                    KeyValue::Hash(fields) => {
                        for (field, value) in fields {
                            argv.push(field.clone().into());
                            argv.push(value.clone().into());
                        }
                    }
                }
                argv
            }
            KeyOp::ChangeTtl(ttl) if *ttl == NO_TTL => vec![word(b"PERSIST"), name],
            KeyOp::ChangeTtl(ttl) => vec![word(b"EXPIRE"), name, ttl.to_string().into()],
        }
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::args::join_args(self.argv()))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn argv(key_type: KeyType, op: KeyOp) -> String {
        CommandKey::new(NKey::new("k", key_type), op).to_string()
    }

    #[test]
    fn key_type_from_type_reply() {
        assert_eq!(KeyType::from_str("zset").unwrap(), KeyType::ZSet);
        assert_eq!(KeyType::from_str("none").unwrap(), KeyType::Missing);
        assert_eq!(KeyType::Hash.to_string(), "hash");
        assert!(KeyType::from_str("ReJSON-RL").is_err());
    }

    #[test]
    fn load_uses_type_specific_verbs() {
        assert_eq!(argv(KeyType::List, KeyOp::Load), "LRANGE k 0 -1");
        assert_eq!(argv(KeyType::Set, KeyOp::Load), "SMEMBERS k");
        assert_eq!(argv(KeyType::ZSet, KeyOp::Load), "ZRANGE k 0 -1");
        assert_eq!(argv(KeyType::Hash, KeyOp::Load), "HGETALL k");
        assert_eq!(argv(KeyType::String, KeyOp::Load), "GET k");
        assert_eq!(argv(KeyType::Stream, KeyOp::Load), "GET k");
    }

    #[test]
    fn create_renders_values() {
        let zset = KeyValue::ZSet(vec![("a".to_string(), 1.5), ("b".to_string(), 2.0)]);
        assert_eq!(argv(KeyType::ZSet, KeyOp::Create(zset)), "ZADD k 1.5 a 2 b");

        let hash = KeyValue::Hash(vec![("f".to_string(), "v w".to_string())]);
        assert_eq!(argv(KeyType::Hash, KeyOp::Create(hash)), r#"HMSET k f "v w""#);

        let string = KeyValue::String("v".to_string());
        assert_eq!(argv(KeyType::String, KeyOp::Create(string)), "SET k v");
    }

    #[test]
    fn ttl_sentinel_persists() {
        assert_eq!(argv(KeyType::String, KeyOp::ChangeTtl(NO_TTL)), "PERSIST k");
        assert_eq!(argv(KeyType::String, KeyOp::ChangeTtl(60)), "EXPIRE k 60");
        assert_eq!(argv(KeyType::String, KeyOp::Delete), "DEL k");
    }

    #[test]
    fn binary_names_are_kept() {
        let name = Bytes::from_static(b"k\xff");
        let cmd = CommandKey::new(NKey::new(name.clone(), KeyType::Hash), KeyOp::Load);

        assert_eq!(cmd.argv(), vec![Bytes::from("HGETALL"), name]);
        assert_eq!(cmd.to_string(), r#"HGETALL "k\xff""#);
    }
}
