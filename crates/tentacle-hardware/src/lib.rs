//! Peripheral access layer for tentacle adaptors.
//!
//! Adaptors that drive wireless peripherals (Bluetooth LE style GATT
//! devices) talk to them through a [`DeviceActor`]: one task per peripheral
//! that owns the link, dials lazily, resolves characteristics against the
//! discovered [`Profile`], enforces their [`Capabilities`] before any I/O,
//! and reconnects with exponential backoff when the link drops.
//!
//! # Design Philosophy
//!
//! - **Async-first**: peripheral clients use native `async fn` in traits
//!   (Rust 1.90 + Edition 2024 RPITIT).
//! - **Single owner**: only the actor task touches a link; callers send
//!   requests and wait for the paired reply.
//! - **Error-aware**: capability mismatches, lookups, timeouts and transport
//!   failures are distinct [`HardwareError`] variants.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tentacle_hardware::mock::MockConnector;
//! use tentacle_hardware::{
//!     Capabilities, Characteristic, ConnectionOptions, DeviceActor, Profile, ResourceKey,
//!     ServiceProfile,
//! };
//!
//! # async fn run() -> tentacle_hardware::Result<()> {
//! let profile = Profile::new().with_service(
//!     ServiceProfile::new("180F").with_characteristic(Characteristic::new(
//!         "2A19",
//!         Capabilities::READ | Capabilities::NOTIFY,
//!     )),
//! );
//! let (connector, _handle) = MockConnector::new(profile);
//! let actor = DeviceActor::spawn(
//!     "battery",
//!     connector,
//!     ConnectionOptions::default().with_auto_reconnect(true),
//! );
//!
//! let level = actor.read(&ResourceKey::characteristic("2a19")).await?;
//! actor
//!     .subscribe(
//!         &ResourceKey::characteristic("2a19"),
//!         Arc::new(|payload: &[u8]| println!("battery: {payload:?}")),
//!     )
//!     .await?;
//! actor.close().await?;
//! # let _ = level;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod backoff;
pub mod error;
pub mod mock;
pub mod state;
pub mod traits;
pub mod types;

pub use actor::{
    ConnectionLostHandler, ConnectionOptions, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_MAX_RECONNECT_INTERVAL, DeviceActor,
};
pub use backoff::Backoff;
pub use error::{HardwareError, Result};
pub use state::{ActorEvent, ActorState};
pub use traits::{Connector, NotificationHandler, PeripheralClient};
pub use types::{Capabilities, Characteristic, Profile, ResourceKey, ServiceProfile};
