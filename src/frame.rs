// https://redis.io/docs/reference/protocol-spec

use std::fmt;
use std::io::Cursor;
use std::string::FromUtf8Error;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error as ThisError;

const CRLF: &[u8; 2] = b"\r\n";

const SIMPLE: u8 = b'+';
const ERROR: u8 = b'-';
const INTEGER: u8 = b':';
const BULK: u8 = b'$';
const BULK_ERROR: u8 = b'!';
const ARRAY: u8 = b'*';
const NULL: u8 = b'_';
// RESP3 types, skipped over but never interpreted.
const BOOLEAN: u8 = b'#';
const DOUBLE: u8 = b',';
const BIG_NUMBER: u8 = b'(';
const VERBATIM: u8 = b'=';
const MAP: u8 = b'%';
const SET: u8 = b'~';
const PUSH: u8 = b'>';

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("invalid frame data type: {0}")]
    InvalidDataType(u8),
    /// Invalid message encoding.
    #[error("{0}")]
    Other(String),
}

impl From<FromUtf8Error> for Error {
    fn from(_src: FromUtf8Error) -> Error {
        Error::Other("invalid UTF-8 in line reply".to_string())
    }
}

/// One reply as it arrives on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
    /// A well framed reply of a type this driver does not interpret (RESP3 doubles, maps, ...).
    /// The payload is consumed so the stream stays aligned.
    Unknown(u8),
}

impl Frame {
    /// Builds the request frame for a command: an array of bulk strings.
    pub fn command<I, A>(argv: I) -> Frame
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        Frame::Array(argv.into_iter().map(|a| Frame::Bulk(a.into())).collect())
    }

    /// Parses one complete reply starting at the cursor position. On success the cursor sits
    /// right after the reply; on [`Error::Incomplete`] its position is meaningless.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        let tag = next_byte(src)?;

        match tag {
            SIMPLE => Ok(Frame::Simple(line_string(src)?)),
            ERROR => Ok(Frame::Error(line_string(src)?)),
            INTEGER => {
                let line = line_string(src)?;
                line.parse::<i64>()
                    .map(Frame::Integer)
                    .map_err(|e| Error::Other(format!("invalid integer {line:?}: {e}")))
            }
            BULK => match length(src)? {
                None => Ok(Frame::Null),
                Some(len) => Ok(Frame::Bulk(Bytes::copy_from_slice(payload(src, len)?))),
            },
            // A null bulk error is not defined, treat it like a null bulk string.
            BULK_ERROR => match length(src)? {
                None => Ok(Frame::Null),
                Some(len) => Ok(Frame::Error(String::from_utf8(payload(src, len)?.to_vec())?)),
            },
            ARRAY => match length(src)? {
                None => Ok(Frame::Null),
                Some(len) => {
                    // The announced length is untrusted until the elements arrive.
                    let mut items = Vec::with_capacity(len.min(1024));
                    for _ in 0..len {
                        items.push(Frame::parse(src)?);
                    }
                    Ok(Frame::Array(items))
                }
            },
            NULL => {
                line(src)?;
                Ok(Frame::Null)
            }
            BOOLEAN | DOUBLE | BIG_NUMBER => {
                line(src)?;
                Ok(Frame::Unknown(tag))
            }
            VERBATIM => {
                if let Some(len) = length(src)? {
                    payload(src, len)?;
                }
                Ok(Frame::Unknown(tag))
            }
            MAP | SET | PUSH => {
                if let Some(len) = length(src)? {
                    let elements = if tag == MAP { len * 2 } else { len };
                    for _ in 0..elements {
                        Frame::parse(src)?;
                    }
                }
                Ok(Frame::Unknown(tag))
            }
            other => Err(Error::InvalidDataType(other)),
        }
    }

    /// Appends the wire encoding of the frame to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => put_line(dst, SIMPLE, s.as_bytes()),
            Frame::Error(s) => put_line(dst, ERROR, s.as_bytes()),
            Frame::Integer(i) => put_line(dst, INTEGER, i.to_string().as_bytes()),
            Frame::Bulk(bytes) => {
                put_line(dst, BULK, bytes.len().to_string().as_bytes());
                dst.reserve(bytes.len() + CRLF.len());
                dst.put_slice(bytes);
                dst.put_slice(CRLF);
            }
            // RESP2 servers only understand the null bulk string.
            Frame::Null | Frame::Unknown(_) => put_line(dst, BULK, b"-1"),
            Frame::Array(items) => {
                put_line(dst, ARRAY, items.len().to_string().as_bytes());
                for item in items {
                    item.write_to(dst);
                }
            }
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut dst = BytesMut::new();
        self.write_to(&mut dst);
        dst.to_vec()
    }

    /// Text of a string-like frame, lossy for non UTF-8 bulk data.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Frame::Simple(s) | Frame::Error(s) => Some(s.clone()),
            Frame::Bulk(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            Frame::Integer(i) => Some(i.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Frame::Null => write!(f, "(nil)"),
            Frame::Unknown(tag) => write!(f, "(unsupported '{}')", *tag as char),
            Frame::Error(s) => write!(f, "(error) {}", s),
            other => write!(f, "{:?}", other.as_text().unwrap_or_default()),
        }
    }
}

fn put_line(dst: &mut BytesMut, tag: u8, body: &[u8]) {
    dst.reserve(1 + body.len() + CRLF.len());
    dst.put_u8(tag);
    dst.put_slice(body);
    dst.put_slice(CRLF);
}

fn next_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

/// The bytes up to the next CRLF, which is consumed.
fn line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let buf: &'a [u8] = *src.get_ref();
    let start = src.position() as usize;
    let rest = buf.get(start..).ok_or(Error::Incomplete)?;

    let end = rest
        .windows(CRLF.len())
        .position(|w| w == CRLF)
        .ok_or(Error::Incomplete)?;

    src.set_position((start + end + CRLF.len()) as u64);
    Ok(&rest[..end])
}

fn line_string(src: &mut Cursor<&[u8]>) -> Result<String, Error> {
    Ok(String::from_utf8(line(src)?.to_vec())?)
}

/// A length header, `None` for the RESP2 null marker `-1`.
fn length(src: &mut Cursor<&[u8]>) -> Result<Option<usize>, Error> {
    let text = line_string(src)?;
    let len: i64 = text
        .parse()
        .map_err(|e| Error::Other(format!("invalid length {text:?}: {e}")))?;

    match len {
        -1 => Ok(None),
        n if n < 0 => Err(Error::Other(format!("invalid length {n}"))),
        n => Ok(Some(n as usize)),
    }
}

/// Exactly `len` bytes followed by CRLF. The payload itself may contain CRLF.
fn payload<'a>(src: &mut Cursor<&'a [u8]>, len: usize) -> Result<&'a [u8], Error> {
    let buf: &'a [u8] = *src.get_ref();
    let start = src.position() as usize;
    let end = start + len;

    let terminator = buf.get(end..end + CRLF.len()).ok_or(Error::Incomplete)?;
    if terminator != CRLF {
        return Err(Error::Other("bulk payload is not terminated by CRLF".to_string()));
    }

    src.set_position((end + CRLF.len()) as u64);
    Ok(&buf[start..end])
}
