use std::path::PathBuf;
use std::time::Duration;
use tentacle_core::AdaptorIdentity;
use tentacle_core::constants::{DEFAULT_SOCKET_DIR, DIAL_TIMEOUT, HUB_SOCKET_NAME};

/// Configuration of one adaptor process.
///
/// # Example
///
/// ```
/// use tentacle_adaptor::AdaptorConfig;
/// use tentacle_core::AdaptorIdentity;
///
/// let identity = AdaptorIdentity::new("dummy", "v1alpha1", "dummy.socket").unwrap();
/// let config = AdaptorConfig::new(identity).with_socket_dir("/tmp/adaptors");
/// assert_eq!(config.endpoint_path().to_str(), Some("/tmp/adaptors/dummy.socket"));
/// assert_eq!(config.hub_path().to_str(), Some("/tmp/adaptors/hub.socket"));
/// ```
#[derive(Debug, Clone)]
pub struct AdaptorConfig {
    /// Identity announced to the hub
    pub identity: AdaptorIdentity,

    /// Directory holding the hub socket and this adaptor's socket
    pub socket_dir: PathBuf,

    /// File name of the hub's registration socket inside `socket_dir`
    pub hub_socket: String,

    /// Bound on the registration dial
    pub dial_timeout: Duration,
}

impl AdaptorConfig {
    pub fn new(identity: AdaptorIdentity) -> Self {
        Self {
            identity,
            socket_dir: PathBuf::from(DEFAULT_SOCKET_DIR),
            hub_socket: HUB_SOCKET_NAME.to_string(),
            dial_timeout: DIAL_TIMEOUT,
        }
    }

    pub fn with_socket_dir(mut self, socket_dir: impl Into<PathBuf>) -> Self {
        self.socket_dir = socket_dir.into();
        self
    }

    pub fn with_hub_socket(mut self, name: impl Into<String>) -> Self {
        self.hub_socket = name.into();
        self
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Path this adaptor listens on.
    #[must_use]
    pub fn endpoint_path(&self) -> PathBuf {
        self.socket_dir.join(self.identity.endpoint())
    }

    #[must_use]
    pub fn hub_path(&self) -> PathBuf {
        self.socket_dir.join(&self.hub_socket)
    }
}
