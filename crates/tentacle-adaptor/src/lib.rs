//! Adaptor side of the hub protocol.
//!
//! An adaptor process binds its own socket in the shared directory, serves
//! the hub on it and registers with the hub:
//!
//! ```text
//! keep_registered ──> hub.socket         Register{name, version, endpoint}
//! AdaptorServer   <── <endpoint>.socket  KeepAlive | Connect streams
//!                        │
//!                        └─> Device per Connect stream
//! ```
//!
//! Concrete adaptors implement [`Adaptor`] and [`Device`]. Two ship with the
//! crate: [`dummy`], a simulated fan, and [`peripheral`], a property-driven
//! device over a `tentacle_hardware::DeviceActor`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tentacle_adaptor::dummy::{ADAPTOR_NAME, DummyAdaptor};
//! use tentacle_adaptor::{AdaptorConfig, AdaptorServer, keep_registered};
//! use tentacle_core::AdaptorIdentity;
//! use tentacle_core::constants::API_VERSION;
//! use tentacle_network::SocketListener;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = AdaptorIdentity::new(ADAPTOR_NAME, API_VERSION, "dummy.socket")?;
//! let config = AdaptorConfig::new(identity);
//! let shutdown = CancellationToken::new();
//!
//! let listener = SocketListener::bind(config.endpoint_path())?;
//! let server = Arc::new(AdaptorServer::new(DummyAdaptor));
//! tokio::spawn(server.serve(listener, shutdown.clone()));
//!
//! keep_registered(config, shutdown).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod dummy;
pub mod error;
pub mod peripheral;
pub mod registration;
pub mod server;

pub use config::AdaptorConfig;
pub use device::{Adaptor, Device, NoParameters, Parameters, Report, StatusReporter};
pub use error::{AdaptorError, Result};
pub use peripheral::{ConnectorFactory, PeripheralAdaptor, PeripheralDevice};
pub use registration::{keep_registered, register, register_with_retry};
pub use server::AdaptorServer;
