//! Unix socket transport for the hub and its adaptors.
//!
//! Every RPC stream is one socket connection speaking the tentacle frame
//! protocol. This crate owns the plumbing underneath both sides:
//!
//! - **dialer**: bounded dial plus the `Open` preface of a new stream
//! - **listener**: binding sockets in the shared directory, stale cleanup
//! - **stream**: framed streams, half-close and end-of-stream classification
//! - **watcher**: socket file creation and removal events
//!
//! # Example
//!
//! ```no_run
//! use tentacle_network::{SocketListener, open_stream, read_preface};
//! use tentacle_protocol::Service;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = SocketListener::bind("/tmp/adaptors/dummy.socket")?;
//! let _dialer = open_stream(listener.path(), Service::KeepAlive, Duration::from_secs(10));
//!
//! let mut accepted = listener.accept().await?;
//! let service = read_preface(&mut accepted, Duration::from_secs(10)).await?;
//! # Ok(())
//! # }
//! ```

pub mod dialer;
pub mod error;
pub mod listener;
pub mod stream;
pub mod watcher;

pub use dialer::{dial, open_stream};
pub use error::{NetworkError, Result};
pub use listener::{SocketListener, cleanup_stale_sockets};
pub use stream::{
    CloseKind, FrameSink, FrameSource, FrameStream, StreamEnd, classify, framed, half_close,
    is_end_of_stream, read_preface, recv_frame,
};
pub use watcher::{SocketEvent, SocketWatcher};
