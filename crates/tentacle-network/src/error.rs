//! Error types for socket transport operations.

use std::path::PathBuf;
use tentacle_protocol::ProtocolError;
use thiserror::Error;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Errors that can occur while dialing, listening or streaming frames.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Dial did not complete within the bound.
    #[error("Dial {path:?} timeout after {timeout_ms}ms")]
    DialTimeout { path: PathBuf, timeout_ms: u64 },

    /// Dial failed outright.
    #[error("Failed to dial {path:?}: {source}")]
    Dial {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Binding the listening socket failed.
    #[error("Failed to listen on {path:?}: {source}")]
    Listen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Peer ended the stream where a frame was expected.
    #[error("Stream closed by peer")]
    Closed,

    /// Peer sent a frame that does not belong at this point of the exchange.
    #[error("Unexpected frame: expected {expected}, got {actual}")]
    UnexpectedFrame {
        expected: &'static str,
        actual: &'static str,
    },

    /// Peer did not send the stream preface in time.
    #[error("Stream preface timeout after {0}ms")]
    PrefaceTimeout(u64),

    /// Frame encoding or decoding failed.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Filesystem watch failed.
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NetworkError {
    pub fn unexpected(expected: &'static str, actual: &'static str) -> Self {
        Self::UnexpectedFrame { expected, actual }
    }
}
