//! Error types for the adaptor side.

use tentacle_hardware::HardwareError;
use tentacle_network::NetworkError;
use tentacle_protocol::{ProtocolError, Status, ValueError};
use thiserror::Error;

/// Result type alias for adaptor operations.
pub type Result<T> = std::result::Result<T, AdaptorError>;

#[derive(Debug, Error)]
pub enum AdaptorError {
    /// The hub answered the registration with an error status.
    #[error("failed to register to hub: {0}")]
    Registration(Status),

    /// Link parameters could not be decoded or failed validation.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The device object of a Connect request could not be decoded.
    #[error("invalid device: {0}")]
    InvalidDevice(String),

    /// The device rejected its configuration.
    #[error("failed to configure device: {0}")]
    Device(String),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl AdaptorError {
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::InvalidParameters(message.into())
    }

    pub fn invalid_device(message: impl Into<String>) -> Self {
        Self::InvalidDevice(message.into())
    }

    pub fn device(message: impl Into<String>) -> Self {
        Self::Device(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tentacle_protocol::StatusCode;

    #[test]
    fn test_error_display() {
        let err = AdaptorError::Registration(Status::new(
            StatusCode::InvalidArgument,
            "the requested name -x- is not qualified",
        ));
        assert!(err.to_string().starts_with("failed to register to hub: "));

        let err = AdaptorError::invalid_parameters("ip is not an address");
        assert_eq!(err.to_string(), "invalid parameters: ip is not an address");

        let err = AdaptorError::from(HardwareError::communication("link down"));
        assert_eq!(err.to_string(), "Communication error: link down");
    }
}
