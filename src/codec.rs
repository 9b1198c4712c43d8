use bytes::{Buf, BytesMut};
use std::env;
use std::io::Cursor;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{self, Frame};
use crate::Error;

const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// Decodes replies out of the connection read buffer and encodes outgoing command frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        // A malformed override falls back to the default instead of aborting the client.
        let max_frame_size = env::var("MAX_FRAME_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_FRAME_SIZE);

        Self { max_frame_size }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&src[..]);
        let frame = match Frame::parse(&mut cursor) {
            Ok(frame) => frame,
            Err(frame::Error::Incomplete) => {
                // Guard against a peer announcing an unbounded reply.
                if src.len() > self.max_frame_size {
                    return Err(Error::Protocol("frame size exceeds limit".to_string()));
                }
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        // Remove the parsed frame from the buffer.
        let position = cursor.position() as usize;
        src.advance(position);

        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        frame.write_to(dst);
        Ok(())
    }
}
