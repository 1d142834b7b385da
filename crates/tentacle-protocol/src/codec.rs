//! Tokio codec for length-prefixed [`Frame`]s.
//!
//! `FrameCodec` plugs the frame format into `tokio_util::codec::Framed` so
//! both the hub and adaptors can treat a Unix stream as a `Stream` + `Sink`
//! of frames.
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use futures::{SinkExt, StreamExt};
//! use tokio::net::UnixStream;
//! use tokio_util::codec::Framed;
//! use tentacle_protocol::{Frame, FrameCodec, Service};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = UnixStream::connect("/var/lib/tentacle/adaptors/dummy.socket").await?;
//! let mut framed = Framed::new(stream, FrameCodec::new());
//!
//! framed.send(Frame::Open(Service::KeepAlive)).await?;
//! framed.send(Frame::Void).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Size limit
//!
//! Frames longer than the configured maximum are rejected on both paths,
//! before any body bytes are buffered on decode.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::Frame;
use crate::error::{ProtocolError, Result};

/// Default maximum frame size in bytes (4 MiB).
///
/// Device objects travel as JSON inside frames, so the limit is far above
/// any realistic spec or status document.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Length-prefixed frame codec.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a new codec with the default maximum frame size.
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Create a new codec with a custom maximum frame size.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Get the current maximum frame size.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&src[..HEADER_LEN]);
        let len = u32::from_be_bytes(header) as usize;

        if len == 0 {
            return Err(ProtocolError::EmptyFrame);
        }
        if len > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max_size: self.max_frame_size,
            });
        }

        if src.len() < HEADER_LEN + len {
            // Wait for the rest; reserve once so the read loop does not regrow.
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let mut payload = src.split_to(len).freeze();
        let kind = payload.get_u8();
        Frame::decode(kind, payload).map(Some)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        let mut body = BytesMut::new();
        item.encode_body(&mut body)?;

        let len = body.len() + 1;
        if len > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max_size: self.max_frame_size,
            });
        }

        dst.reserve(HEADER_LEN + len);
        dst.put_u32(len as u32);
        dst.put_u8(item.kind());
        dst.extend_from_slice(&body);
        Ok(())
    }
}
