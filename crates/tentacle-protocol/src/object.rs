//! Self-describing device object envelope.
//!
//! Desired and observed device state travel as JSON documents shaped like
//!
//! ```json
//! {
//!   "apiVersion": "devices.tentacle.io/v1alpha1",
//!   "kind": "DummyDevice",
//!   "metadata": { "namespace": "default", "name": "living-room-fan" },
//!   "spec": { "on": true, "gear": "fast" },
//!   "status": { "gear": "fast", "rotatingSpeed": 200 }
//! }
//! ```
//!
//! The envelope knows nothing about the spec or status schemas. Each side
//! converts those sections to its own typed structs with [`DeviceObject::spec_as`],
//! [`DeviceObject::status_as`] and [`DeviceObject::set_status`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tentacle_core::LinkKey;

use crate::error::Result;

/// Identity section of a device object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
}

/// Device object exchanged on Connect streams.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceObject {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub spec: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub status: Value,
}

impl DeviceObject {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>, key: &LinkKey) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            metadata: ObjectMeta {
                namespace: key.namespace().to_string(),
                name: key.name().to_string(),
            },
            spec: Value::Null,
            status: Value::Null,
        }
    }

    /// Decode an object from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode the object as JSON bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Link key built from the metadata, if both namespace and name are set.
    #[must_use]
    pub fn link_key(&self) -> Option<LinkKey> {
        if self.metadata.namespace.is_empty() || self.metadata.name.is_empty() {
            return None;
        }
        LinkKey::new(&self.metadata.namespace, &self.metadata.name).ok()
    }

    pub fn spec_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.spec)?)
    }

    pub fn status_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.status)?)
    }

    /// Replace the spec section.
    pub fn with_spec<T: Serialize>(mut self, spec: &T) -> Result<Self> {
        self.spec = serde_json::to_value(spec)?;
        Ok(self)
    }

    /// Replace the status section.
    pub fn set_status<T: Serialize>(&mut self, status: &T) -> Result<()> {
        self.status = serde_json::to_value(status)?;
        Ok(())
    }
}
