//! Error types for peripheral operations.
//!
//! Errors fall into four groups that callers treat differently:
//!
//! - capability mismatches, raised before any I/O is attempted
//! - lookups that found no matching service or characteristic
//! - timeouts while dialing
//! - transport failures reported by the peripheral client

use crate::types::ResourceKey;

/// Result type alias for peripheral operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while talking to a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HardwareError {
    /// The characteristic does not declare the read capability.
    #[error("target characteristic {resource} is not readable")]
    IncompatibleRead { resource: ResourceKey },

    /// The characteristic declares neither write capability.
    #[error("target characteristic {resource} is not writable")]
    IncompatibleWrite { resource: ResourceKey },

    /// The characteristic declares neither notify nor indicate.
    #[error("target characteristic {resource} is not notifiable")]
    IncompatibleSubscribe { resource: ResourceKey },

    /// The client has not discovered a profile yet.
    #[error("the profile of peripheral {peripheral} is not found")]
    ProfileNotFound { peripheral: String },

    #[error("failed to find service {service}")]
    ServiceNotFound { service: String },

    #[error("failed to find characteristic {resource}")]
    CharacteristicNotFound { resource: ResourceKey },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The peripheral terminated the link.
    #[error("target peripheral {peripheral} terminated the connection")]
    ConnectionClosed { peripheral: String },

    /// Transport error reported by the peripheral client.
    #[error("Communication error: {message}")]
    Communication { message: String },

    /// The device actor was closed; no further operations are served.
    #[error("device actor {peripheral} is closed")]
    ActorClosed { peripheral: String },

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl HardwareError {
    /// Create a communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }

    /// Create a timeout error from a duration.
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout {
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn connection_closed(peripheral: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            peripheral: peripheral.into(),
        }
    }

    pub fn actor_closed(peripheral: impl Into<String>) -> Self {
        Self::ActorClosed {
            peripheral: peripheral.into(),
        }
    }

    /// Returns `true` when the target lacks the capability the operation needs.
    #[must_use]
    pub fn is_capability_mismatch(&self) -> bool {
        matches!(
            self,
            Self::IncompatibleRead { .. }
                | Self::IncompatibleWrite { .. }
                | Self::IncompatibleSubscribe { .. }
        )
    }

    /// Returns `true` when the target could not be resolved.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ProfileNotFound { .. }
                | Self::ServiceNotFound { .. }
                | Self::CharacteristicNotFound { .. }
        )
    }
}
