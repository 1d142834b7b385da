//! Hub side of the adaptor protocol.
//!
//! The hub discovers adaptors through their registration requests, keeps a
//! connection pool towards each one, and opens one Connect stream per device
//! link on behalf of orchestrator logic.
//!
//! # Architecture
//!
//! ```text
//! RegistrationServer ──> PoolManager ──> AdaptorPools
//!                                            │
//!                                            ├─> ConnectionPool "dummy"
//!                                            │       ├─> KeepAlive heartbeat
//!                                            │       └─> Connection per link
//!                                            └─> ConnectionPool "ble"
//! ```
//!
//! Orchestrator logic calls [`PoolManager::create_connection`],
//! [`PoolManager::delete_connection`] and [`PoolManager::send_data`], and
//! listens through [`RegistrationObserver`] and [`DeviceObserver`].

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod manager;
pub mod pool;
pub mod registration;

pub use config::HubConfig;
pub use connection::{Connection, ConnectionInfo};
pub use error::{HubError, Result};
pub use events::{
    ChannelObserver, DeviceObserver, EventNotifier, HubEvent, RegistrationEvent,
    RegistrationObserver,
};
pub use manager::{AdaptorPools, PoolManager};
pub use pool::{ConnectionPool, run_heartbeat};
pub use registration::RegistrationServer;
