#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::codec::Decoder;

use redis_admin::codec::FrameCodec;
use redis_admin::config::ConnectionConfig;
use redis_admin::connection::Connection;
use redis_admin::frame::Frame;

/// A listener whose single client receives whatever is sent through the returned channel.
pub async fn create_tcp_connection() -> Result<(UnboundedSender<Vec<u8>>, TcpStream), std::io::Error>
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let local_addr = listener.local_addr()?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            while let Some(data) = rx.recv().await {
                if socket.write_all(&data).await.is_err() {
                    break;
                }
            }
        }
    });

    let stream = TcpStream::connect(local_addr).await?;

    Ok((tx, stream))
}

/// A server that writes `reply` as soon as the client sends anything, then closes the socket.
pub async fn spawn_raw_server(reply: Vec<u8>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 64];
            if socket.read(&mut buf).await.unwrap_or(0) > 0 {
                let _ = socket.write_all(&reply).await;
                let _ = socket.shutdown().await;
            }
        }
    });

    addr
}

/// A server answering every request with `handler(argv)`. Returning `None` closes the
/// connection. Accepts any number of clients, one after the other.
pub async fn spawn_server<F>(mut handler: F) -> SocketAddr
where
    F: FnMut(Vec<String>) -> Option<Frame> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut codec = FrameCodec::new();
            let mut buffer = BytesMut::with_capacity(4096);

            'client: loop {
                match socket.read_buf(&mut buffer).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }

                let mut out = Vec::new();
                while let Ok(Some(frame)) = codec.decode(&mut buffer) {
                    match handler(argv(frame)) {
                        Some(reply) => out.extend(reply.serialize()),
                        None => {
                            let _ = socket.write_all(&out).await;
                            break 'client;
                        }
                    }
                }
                if socket.write_all(&out).await.is_err() {
                    break;
                }
            }
        }
    });

    addr
}

fn argv(frame: Frame) -> Vec<String> {
    match frame {
        Frame::Array(parts) => parts.iter().filter_map(Frame::as_text).collect(),
        other => other.as_text().into_iter().collect(),
    }
}

/// Connection over TCP to `addr`, already connected.
pub async fn connect(addr: SocketAddr) -> Connection {
    let mut conn = Connection::new(ConnectionConfig::tcp(addr.ip().to_string(), addr.port()));
    conn.connect(false).await.unwrap();
    conn
}

pub fn ok() -> Frame {
    Frame::Simple("OK".to_string())
}

pub fn bulk(s: &str) -> Frame {
    Frame::Bulk(Bytes::copy_from_slice(s.as_bytes()))
}

pub fn array<I, S>(items: I) -> Frame
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Frame::Array(items.into_iter().map(|s| bulk(s.as_ref())).collect())
}

#[derive(Debug, Clone)]
pub enum Value {
    String(String),
    List(Vec<String>),
    Set(Vec<String>),
    Hash(Vec<(String, String)>),
    ZSet(Vec<(String, f64)>),
}

/// An in-memory keyspace answering the read-only commands the driver issues on its own.
#[derive(Debug, Clone, Default)]
pub struct Keyspace {
    entries: BTreeMap<String, Value>,
    ttls: BTreeMap<String, i64>,
    /// Keys per SCAN page when the request has no COUNT.
    pub page_size: usize,
}

impl Keyspace {
    pub fn new() -> Self {
        Self {
            page_size: 2,
            ..Default::default()
        }
    }

    pub fn insert(mut self, key: &str, value: Value) -> Self {
        self.entries.insert(key.to_string(), value);
        self
    }

    pub fn expire(mut self, key: &str, ttl: i64) -> Self {
        self.ttls.insert(key.to_string(), ttl);
        self
    }

    pub fn handle(&self, argv: Vec<String>) -> Frame {
        let verb = argv.first().map(|v| v.to_uppercase()).unwrap_or_default();
        let arg = |i: usize| argv.get(i).cloned().unwrap_or_default();

        match verb.as_str() {
            "PING" => Frame::Simple("PONG".to_string()),
            "SELECT" => ok(),
            "DBSIZE" => Frame::Integer(self.entries.len() as i64),
            "CONFIG" if arg(1).eq_ignore_ascii_case("GET") && arg(2) == "databases" => {
                array(["databases", "16"])
            }
            "SCAN" => self.scan(&argv),
            "TYPE" => Frame::Simple(
                match self.entries.get(&arg(1)) {
                    Some(Value::String(_)) => "string",
                    Some(Value::List(_)) => "list",
                    Some(Value::Set(_)) => "set",
                    Some(Value::Hash(_)) => "hash",
                    Some(Value::ZSet(_)) => "zset",
                    None => "none",
                }
                .to_string(),
            ),
            "TTL" => match self.entries.get(&arg(1)) {
                Some(_) => Frame::Integer(self.ttls.get(&arg(1)).copied().unwrap_or(-1)),
                None => Frame::Integer(-2),
            },
            "STRLEN" | "LLEN" | "SCARD" | "HLEN" | "ZCARD" => self.size(&verb, &arg(1)),
            _ => Frame::Error(format!("ERR unknown command '{}'", arg(0))),
        }
    }

    fn size(&self, verb: &str, key: &str) -> Frame {
        let size = match (verb, self.entries.get(key)) {
            (_, None) => 0,
            ("STRLEN", Some(Value::String(s))) => s.len(),
            ("LLEN", Some(Value::List(items))) | ("SCARD", Some(Value::Set(items))) => items.len(),
            ("HLEN", Some(Value::Hash(fields))) => fields.len(),
            ("ZCARD", Some(Value::ZSet(members))) => members.len(),
            _ => {
                return Frame::Error(
                    "WRONGTYPE Operation against a key holding the wrong kind of value"
                        .to_string(),
                )
            }
        };
        Frame::Integer(size as i64)
    }

    fn scan(&self, argv: &[String]) -> Frame {
        let cursor: usize = argv.get(1).and_then(|c| c.parse().ok()).unwrap_or(0);
        let mut pattern = None;
        let mut count = self.page_size;

        let mut options = argv[2.min(argv.len())..].chunks(2);
        while let Some([name, value]) = options.next() {
            match name.to_uppercase().as_str() {
                "MATCH" => pattern = Some(value.clone()),
                "COUNT" => count = value.parse().unwrap_or(count),
                _ => {}
            }
        }

        let keys: Vec<&String> = self.entries.keys().collect();
        let end = (cursor + count).min(keys.len());
        let page: Vec<&str> = keys[cursor.min(end)..end]
            .iter()
            .filter(|k| {
                pattern
                    .as_deref()
                    .map_or(true, |p| glob_match::glob_match(p, k.as_str()))
            })
            .map(|k| k.as_str())
            .collect();
        let next = if end >= keys.len() { 0 } else { end };

        Frame::Array(vec![bulk(&next.to_string()), array(page)])
    }
}
