use std::path::{Path, PathBuf};
use std::time::Duration;
use tentacle_core::constants::{DEFAULT_SOCKET_DIR, DIAL_TIMEOUT, HEARTBEAT_INTERVAL, HUB_SOCKET_NAME};

/// Configuration of the hub's registration endpoint and adaptor pools.
///
/// # Example
///
/// ```
/// use tentacle_hub::HubConfig;
/// use std::time::Duration;
///
/// let config = HubConfig::default()
///     .with_socket_dir("/tmp/adaptors")
///     .with_dial_timeout(Duration::from_secs(2));
/// assert_eq!(config.registration_path().to_str(), Some("/tmp/adaptors/hub.socket"));
/// ```
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Directory holding the hub socket and every adaptor socket
    pub socket_dir: PathBuf,

    /// File name of the registration socket inside `socket_dir`
    pub registration_socket: String,

    /// Bound on every dial towards an adaptor
    pub dial_timeout: Duration,

    /// Interval between keepalive heartbeats
    pub heartbeat_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            socket_dir: PathBuf::from(DEFAULT_SOCKET_DIR),
            registration_socket: HUB_SOCKET_NAME.to_string(),
            dial_timeout: DIAL_TIMEOUT,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }
}

impl HubConfig {
    pub fn with_socket_dir(mut self, socket_dir: impl Into<PathBuf>) -> Self {
        self.socket_dir = socket_dir.into();
        self
    }

    pub fn with_registration_socket(mut self, name: impl Into<String>) -> Self {
        self.registration_socket = name.into();
        self
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub fn registration_path(&self) -> PathBuf {
        self.socket_dir.join(&self.registration_socket)
    }

    /// Absolute path of an adaptor endpoint.
    #[must_use]
    pub fn endpoint_path(&self, endpoint: impl AsRef<Path>) -> PathBuf {
        self.socket_dir.join(endpoint)
    }
}
