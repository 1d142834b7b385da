//! Framed socket streams and end-of-stream classification.
//!
//! A [`FrameStream`] is one RPC stream. Long-lived readers feed every read
//! outcome through [`classify`] so that expected closes can be told apart
//! from genuine failures:
//!
//! ```text
//! read outcome                      │ StreamEnd
//! ──────────────────────────────────┼───────────────────────
//! Ok(None) (peer half-closed)       │ Closed(Passive)
//! reset / broken pipe / eof         │ Closed(Passive)
//! aborted by us (local cancel)      │ Closed(Active)
//! anything else                     │ Failed(error)
//! ```

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::io::ErrorKind;
use std::time::Duration;
use tentacle_protocol::{Frame, FrameCodec, ProtocolError, Service};
use tokio::net::UnixStream;
use tokio_util::codec::Framed;

use crate::error::{NetworkError, Result};

/// One RPC stream over a Unix socket.
pub type FrameStream = Framed<UnixStream, FrameCodec>;

/// Write half of a split [`FrameStream`].
pub type FrameSink = SplitSink<FrameStream, Frame>;

/// Read half of a split [`FrameStream`].
pub type FrameSource = SplitStream<FrameStream>;

/// Wrap a connected socket.
pub fn framed(stream: UnixStream) -> FrameStream {
    Framed::new(stream, FrameCodec::new())
}

/// Which side ended the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// This side cancelled the stream.
    Active,
    /// The transport is closing from the peer's side.
    Passive,
}

/// How a read loop ended.
#[derive(Debug)]
pub enum StreamEnd {
    /// Normal end of stream, not a failure.
    Closed(CloseKind),
    /// Unexpected error worth reporting.
    Failed(ProtocolError),
}

impl StreamEnd {
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamEnd::Closed(_))
    }
}

/// Classify a read outcome that ends a read loop.
///
/// `None` means the peer finished its write side cleanly.
pub fn classify(outcome: Option<ProtocolError>) -> StreamEnd {
    let Some(error) = outcome else {
        return StreamEnd::Closed(CloseKind::Passive);
    };
    match &error {
        ProtocolError::Io(io) => match io.kind() {
            ErrorKind::ConnectionAborted => StreamEnd::Closed(CloseKind::Active),
            ErrorKind::ConnectionReset
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::NotConnected => StreamEnd::Closed(CloseKind::Passive),
            _ => StreamEnd::Failed(error),
        },
        _ => StreamEnd::Failed(error),
    }
}

/// Returns `true` if a send error means the peer is gone rather than broken.
#[must_use]
pub fn is_end_of_stream(error: &ProtocolError) -> bool {
    matches!(
        error,
        ProtocolError::Io(io) if matches!(
            io.kind(),
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::NotConnected
        )
    )
}

/// Read the next frame, treating end of stream as [`NetworkError::Closed`].
pub async fn recv_frame<S>(source: &mut S) -> Result<Frame>
where
    S: futures::Stream<Item = std::result::Result<Frame, ProtocolError>> + Unpin,
{
    match source.next().await {
        Some(Ok(frame)) => Ok(frame),
        Some(Err(e)) => Err(e.into()),
        None => Err(NetworkError::Closed),
    }
}

/// Read the open preface of an accepted stream.
pub async fn read_preface(stream: &mut FrameStream, timeout: Duration) -> Result<Service> {
    match tokio::time::timeout(timeout, recv_frame(stream)).await {
        Ok(Ok(Frame::Open(service))) => Ok(service),
        Ok(Ok(other)) => Err(NetworkError::unexpected("Open", other.name())),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(NetworkError::PrefaceTimeout(timeout.as_millis() as u64)),
    }
}

/// Flush pending frames and shut down the write half.
///
/// The peer observes a clean end of stream; this side can keep reading.
pub async fn half_close(sink: &mut FrameSink) -> Result<()> {
    sink.close().await.map_err(NetworkError::from)
}
