//! Peripheral metadata shared by clients, mocks and the device actor.
//!
//! A [`Profile`] is what a client discovered after connecting: a list of
//! services, each with characteristics that declare their [`Capabilities`].
//! Operations address a characteristic through a [`ResourceKey`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

use crate::error::{HardwareError, Result};

/// Capability flags declared by a characteristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Self = Self(0);
    pub const READ: Self = Self(1 << 0);
    pub const WRITE: Self = Self(1 << 1);
    pub const WRITE_WITHOUT_RESPONSE: Self = Self(1 << 2);
    pub const NOTIFY: Self = Self(1 << 3);
    pub const INDICATE: Self = Self(1 << 4);

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` when every flag of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` when at least one flag of `other` is set.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub fn can_read(self) -> bool {
        self.contains(Self::READ)
    }

    #[must_use]
    pub fn can_write(self) -> bool {
        self.intersects(Self::WRITE | Self::WRITE_WITHOUT_RESPONSE)
    }

    #[must_use]
    pub fn can_subscribe(self) -> bool {
        self.intersects(Self::NOTIFY | Self::INDICATE)
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::READ, "read"),
            (Self::WRITE, "write"),
            (Self::WRITE_WITHOUT_RESPONSE, "write-without-response"),
            (Self::NOTIFY, "notify"),
            (Self::INDICATE, "indicate"),
        ];
        let set: Vec<_> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", set.join("|"))
        }
    }
}

/// Address of a characteristic.
///
/// An empty `service` searches every service of the profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    #[serde(default)]
    pub service: String,
    pub characteristic: String,
}

impl ResourceKey {
    pub fn new(service: impl Into<String>, characteristic: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            characteristic: characteristic.into(),
        }
    }

    /// Key that matches the characteristic in any service.
    pub fn characteristic(characteristic: impl Into<String>) -> Self {
        Self::new("", characteristic)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.service.is_empty() {
            write!(f, "{}", self.characteristic)
        } else {
            write!(f, "{}/{}", self.service, self.characteristic)
        }
    }
}

/// A discovered characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub uuid: String,
    pub capabilities: Capabilities,
}

impl Characteristic {
    pub fn new(uuid: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            uuid: uuid.into(),
            capabilities,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceProfile {
    pub uuid: String,
    pub characteristics: Vec<Characteristic>,
}

impl ServiceProfile {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, characteristic: Characteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    fn find(&self, uuid: &str) -> Option<&Characteristic> {
        self.characteristics
            .iter()
            .find(|c| c.uuid.eq_ignore_ascii_case(uuid))
    }
}

/// Services and characteristics discovered on a peripheral.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub services: Vec<ServiceProfile>,
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: ServiceProfile) -> Self {
        self.services.push(service);
        self
    }

    /// Resolve a resource key against the profile.
    ///
    /// UUIDs compare case-insensitively.
    ///
    /// # Errors
    ///
    /// `ServiceNotFound` when the key names an unknown service, and
    /// `CharacteristicNotFound` when no characteristic matches.
    pub fn find(&self, key: &ResourceKey) -> Result<&Characteristic> {
        let found = if key.service.is_empty() {
            self.services.iter().find_map(|s| s.find(&key.characteristic))
        } else {
            let service = self
                .services
                .iter()
                .find(|s| s.uuid.eq_ignore_ascii_case(&key.service))
                .ok_or_else(|| HardwareError::ServiceNotFound {
                    service: key.service.clone(),
                })?;
            service.find(&key.characteristic)
        };

        found.ok_or_else(|| HardwareError::CharacteristicNotFound {
            resource: key.clone(),
        })
    }
}
