//! Contract between the generic service loop and concrete adaptors.
//!
//! An [`Adaptor`] creates one [`Device`] per Connect stream. The service
//! loop decodes each desired-state request into the device's
//! [`Parameters`] and a [`DeviceObject`] and hands both to
//! [`Device::configure`]. Devices publish observed state at any time through
//! the [`StatusReporter`] they were created with.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use tentacle_core::LinkKey;
use tentacle_protocol::DeviceObject;
use tokio::sync::mpsc;

use crate::error::Result;

/// Link parameters of a device, decoded from the link's raw JSON.
///
/// Empty parameters decode to `Default`.
pub trait Parameters: DeserializeOwned + Default + Send + 'static {
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Parameters of devices that take none.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoParameters {}

impl Parameters for NoParameters {}

/// One device driven through one Connect stream.
pub trait Device: Send + 'static {
    type Parameters: Parameters;

    /// Apply desired state. An error ends the stream.
    fn configure(
        &mut self,
        parameters: Self::Parameters,
        device: DeviceObject,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Release everything the device holds. Called once when the stream ends.
    fn shutdown(&mut self) -> impl Future<Output = ()> + Send;
}

/// Factory of devices for one adaptor process.
pub trait Adaptor: Send + Sync + 'static {
    type Device: Device;

    fn create_device(&self, key: LinkKey, reporter: StatusReporter) -> Self::Device;
}

/// Message queued for the Connect stream a device belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Device(DeviceObject),
    Error(String),
}

/// Sends observed state up the Connect stream of a device.
///
/// Reporting never blocks; reports queue until the service loop writes them.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: mpsc::UnboundedSender<Report>,
}

impl StatusReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Report>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue an observed device object. Returns `false` once the stream ended.
    pub fn report(&self, device: DeviceObject) -> bool {
        self.tx.send(Report::Device(device)).is_ok()
    }

    /// Queue an error for the hub. The stream stays open.
    pub fn report_error(&self, message: impl Into<String>) -> bool {
        self.tx.send(Report::Error(message.into())).is_ok()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
