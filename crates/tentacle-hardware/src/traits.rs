//! Peripheral client trait definitions.
//!
//! A [`Connector`] dials one peripheral and yields a [`PeripheralClient`]
//! bound to that link. The device actor is the only caller of both traits:
//! it owns the client and serializes every operation on it.
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! with the returned futures spelled out as `Send` so the actor can run them
//! on a spawned task.

use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::{Characteristic, Profile};

/// Callback invoked with the payload of every notification or indication.
pub type NotificationHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Dials a peripheral.
pub trait Connector: Send + Sync + 'static {
    type Client: PeripheralClient;

    /// Connect and discover the peripheral's profile.
    ///
    /// The actor bounds this call with its connect timeout.
    fn connect(&self) -> impl Future<Output = Result<Self::Client>> + Send;
}

/// One live link to a peripheral.
pub trait PeripheralClient: Send + Sync + 'static {
    /// Profile discovered while connecting, if any.
    fn profile(&self) -> Option<&Profile>;

    fn read(&self, characteristic: &Characteristic) -> impl Future<Output = Result<Vec<u8>>> + Send;

    fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
        without_response: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Subscribe to notifications, or indications when `indicate` is set.
    fn subscribe(
        &self,
        characteristic: &Characteristic,
        indicate: bool,
        handler: NotificationHandler,
    ) -> impl Future<Output = Result<()>> + Send;

    fn clear_subscriptions(&self) -> impl Future<Output = Result<()>> + Send;

    /// Token cancelled once the link is lost.
    fn disconnected(&self) -> CancellationToken;

    fn cancel_connection(&self) -> impl Future<Output = Result<()>> + Send;
}
