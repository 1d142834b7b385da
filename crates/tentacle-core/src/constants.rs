//! Well-known paths, versions and intervals shared by the hub and adaptors.
//!
//! Both sides of the registration handshake must agree on these values, so
//! they live in one place instead of being repeated in each crate.
//!
//! # Layout on disk
//!
//! ```text
//! /var/lib/tentacle/adaptors/
//! ├── hub.socket      <- registration endpoint served by the hub
//! ├── dummy.socket    <- served by the "dummy" adaptor
//! └── ble.socket      <- served by the "ble" adaptor
//! ```
//!
//! # Usage
//!
//! ```
//! use tentacle_core::constants::*;
//! use std::path::Path;
//!
//! let hub = Path::new(DEFAULT_SOCKET_DIR).join(HUB_SOCKET_NAME);
//! assert_eq!(hub.to_str(), Some("/var/lib/tentacle/adaptors/hub.socket"));
//! assert!(SUPPORTED_VERSIONS.contains(&API_VERSION));
//! ```

use std::time::Duration;

// ============================================================================
// Protocol Versions
// ============================================================================

/// Adaptor API version spoken by this build.
pub const API_VERSION: &str = "v1alpha1";

/// Versions the hub accepts during registration.
///
/// A register request carrying any other version is rejected before the
/// name or endpoint are even looked at.
pub const SUPPORTED_VERSIONS: &[&str] = &[API_VERSION];

// ============================================================================
// Filesystem Layout
// ============================================================================

/// Directory holding the hub socket and every adaptor socket.
pub const DEFAULT_SOCKET_DIR: &str = "/var/lib/tentacle/adaptors/";

/// File name of the hub registration socket inside [`DEFAULT_SOCKET_DIR`].
pub const HUB_SOCKET_NAME: &str = "hub.socket";

/// Suffix every endpoint file must carry.
pub const SOCKET_SUFFIX: &str = ".socket";

// ============================================================================
// Timing
// ============================================================================

/// Upper bound for dialing or binding a local socket.
///
/// # Value: 10 seconds
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between keepalive heartbeats sent from a pool to its adaptor.
///
/// Neither side negotiates it.
///
/// # Value: 2 minutes
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(120);

// ============================================================================
// Qualified Name Limits
// ============================================================================

/// Maximum length of the name part of a qualified name.
pub const QUALIFIED_NAME_MAX_LENGTH: usize = 63;

/// Maximum length of the optional DNS subdomain prefix of a qualified name.
pub const DNS_SUBDOMAIN_MAX_LENGTH: usize = 253;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_versions_include_current() {
        assert_eq!(SUPPORTED_VERSIONS, &["v1alpha1"]);
    }

    #[test]
    fn test_hub_socket_carries_suffix() {
        assert!(HUB_SOCKET_NAME.ends_with(SOCKET_SUFFIX));
    }

    #[test]
    fn test_intervals() {
        assert_eq!(DIAL_TIMEOUT.as_secs(), 10);
        assert_eq!(HEARTBEAT_INTERVAL.as_secs(), 120);
    }
}
