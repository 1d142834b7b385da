//! Error types for the hub side of the adaptor protocol.

use tentacle_core::LinkKey;
use tentacle_network::NetworkError;
use tentacle_protocol::{ProtocolError, Status, StatusCode};
use thiserror::Error;

/// Result type alias for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;

#[derive(Debug, Error)]
pub enum HubError {
    /// Registration request failed validation.
    #[error("{0}")]
    InvalidArgument(String),

    /// Registration was valid but the hub could not serve it.
    #[error("{0}")]
    Internal(String),

    /// No pool is registered under the adaptor name.
    #[error("adaptor isn't existed: {0}")]
    AdaptorNotFound(String),

    /// No connection is open for the link.
    #[error("adaptor is not existed")]
    ConnectionNotFound(LinkKey),

    /// The connection of the link already ended.
    #[error("connection of {0} is closed")]
    ConnectionClosed(LinkKey),

    /// The pool was stopped or its adaptor went away.
    #[error("connection pool of adaptor {0} is stopped")]
    PoolStopped(String),

    /// The adaptor answered a desired state with an error.
    #[error("adaptor reported: {0}")]
    Adaptor(String),

    #[error("failed on receiving: {0}")]
    Receive(String),

    #[error("Transport error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl HubError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Status frame answering a failed registration.
    #[must_use]
    pub fn to_status(&self) -> Status {
        let code = match self {
            HubError::InvalidArgument(_) => StatusCode::InvalidArgument,
            _ => StatusCode::Internal,
        };
        Status::new(code, self.to_string())
    }
}

impl From<tentacle_core::Error> for HubError {
    fn from(e: tentacle_core::Error) -> Self {
        if e.is_invalid_argument() {
            HubError::InvalidArgument(e.to_string())
        } else {
            HubError::Internal(e.to_string())
        }
    }
}
