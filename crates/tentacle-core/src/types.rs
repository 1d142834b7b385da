use crate::{Result, error::Error, validation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity an adaptor announces when it registers with the hub.
///
/// Construct it with [`AdaptorIdentity::new`], which runs the same checks
/// the hub applies on its side, in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdaptorIdentity {
    name: String,
    version: String,
    endpoint: String,
}

impl AdaptorIdentity {
    /// Create a validated identity.
    ///
    /// # Errors
    /// Returns the first failing rule among version, name and endpoint.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self> {
        let identity = Self {
            name: name.into(),
            version: version.into(),
            endpoint: endpoint.into(),
        };
        identity.validate()?;
        Ok(identity)
    }

    /// Create an identity without validating it.
    ///
    /// Used on the receiving side of the handshake, where the request has to
    /// be decoded before it can be judged.
    #[must_use]
    pub fn unchecked(
        name: impl Into<String>,
        version: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Validate version, name and endpoint in that order.
    pub fn validate(&self) -> Result<()> {
        validation::validate_version(&self.version)?;
        validation::validate_qualified_name(&self.name)?;
        validation::validate_endpoint(&self.endpoint)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Socket file name, relative to the shared socket directory.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl fmt::Display for AdaptorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{} ({})", self.name, self.version, self.endpoint)
    }
}

/// Key of one device link inside a connection pool: `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkKey {
    namespace: String,
    name: String,
}

impl LinkKey {
    /// Create a link key.
    ///
    /// # Errors
    /// Returns `Error::InvalidLink` if the name is empty.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let key = Self {
            namespace: namespace.into(),
            name: name.into(),
        };
        if key.name.is_empty() {
            return Err(Error::InvalidLink("name must be non-empty".to_string()));
        }
        Ok(key)
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl std::str::FromStr for LinkKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((namespace, name)) => LinkKey::new(namespace, name),
            None => Err(Error::InvalidLink(format!("expected namespace/name, got {s}"))),
        }
    }
}

/// Reference to one desired device binding, as handed over by the
/// orchestrator's reconciliation logic.
///
/// `parameters` is opaque JSON owned by the target adaptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLinkRef {
    key: LinkKey,
    adaptor: String,
    #[serde(default)]
    parameters: Vec<u8>,
}

impl DeviceLinkRef {
    pub fn new(key: LinkKey, adaptor: impl Into<String>) -> Self {
        Self {
            key,
            adaptor: adaptor.into(),
            parameters: Vec::new(),
        }
    }

    /// Attach the adaptor parameters as raw JSON bytes.
    #[must_use]
    pub fn with_parameters(mut self, parameters: impl Into<Vec<u8>>) -> Self {
        self.parameters = parameters.into();
        self
    }

    #[must_use]
    pub fn key(&self) -> &LinkKey {
        &self.key
    }

    #[must_use]
    pub fn adaptor(&self) -> &str {
        &self.adaptor
    }

    #[must_use]
    pub fn parameters(&self) -> &[u8] {
        &self.parameters
    }
}
