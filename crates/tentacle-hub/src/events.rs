//! Observer interfaces through which the hub reports to orchestrator logic.
//!
//! Pools and connections never call back into the manager. Everything they
//! learn (adaptor health, observed device state, stream failures) leaves
//! through these two narrow traits.

use std::fmt;
use std::sync::Arc;
use tentacle_core::LinkKey;
use tentacle_protocol::DeviceObject;
use tokio::sync::mpsc;

use crate::error::HubError;

/// Lifecycle and health of one adaptor's connection pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    Started,
    Stopped,
    Healthy,
    Unhealthy(String),
}

impl fmt::Display for RegistrationEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegistrationEvent::Started => write!(f, "Started"),
            RegistrationEvent::Stopped => write!(f, "Stopped"),
            RegistrationEvent::Healthy => write!(f, "Healthy"),
            RegistrationEvent::Unhealthy(msg) => write!(f, "Unhealthy: {msg}"),
        }
    }
}

/// Receives registration events of every adaptor.
pub trait RegistrationObserver: Send + Sync + 'static {
    fn on_registration(&self, adaptor: &str, event: RegistrationEvent);
}

/// Receives observed device state, and failures of the streams carrying it.
pub trait DeviceObserver: Send + Sync + 'static {
    fn on_device_changes(
        &self,
        adaptor: &str,
        link: &LinkKey,
        observed: std::result::Result<DeviceObject, HubError>,
    );
}

/// Binds registration events to the adaptor a pool belongs to.
#[derive(Clone)]
pub struct EventNotifier {
    adaptor: String,
    observer: Option<Arc<dyn RegistrationObserver>>,
}

impl EventNotifier {
    pub fn new(adaptor: impl Into<String>, observer: Option<Arc<dyn RegistrationObserver>>) -> Self {
        Self {
            adaptor: adaptor.into(),
            observer,
        }
    }

    pub fn notice(&self, event: RegistrationEvent) {
        if let Some(observer) = &self.observer {
            observer.on_registration(&self.adaptor, event);
        }
    }
}

/// Everything the hub reports, flattened into one enum.
#[derive(Debug)]
pub enum HubEvent {
    Registration {
        adaptor: String,
        event: RegistrationEvent,
    },
    Device {
        adaptor: String,
        link: LinkKey,
        observed: std::result::Result<DeviceObject, String>,
    },
}

/// Observer forwarding every callback into an unbounded channel.
///
/// Useful wherever events are consumed by a task instead of inline.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<HubEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HubEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RegistrationObserver for ChannelObserver {
    fn on_registration(&self, adaptor: &str, event: RegistrationEvent) {
        let _ = self.tx.send(HubEvent::Registration {
            adaptor: adaptor.to_string(),
            event,
        });
    }
}

impl DeviceObserver for ChannelObserver {
    fn on_device_changes(
        &self,
        adaptor: &str,
        link: &LinkKey,
        observed: std::result::Result<DeviceObject, HubError>,
    ) {
        let _ = self.tx.send(HubEvent::Device {
            adaptor: adaptor.to_string(),
            link: link.clone(),
            observed: observed.map_err(|e| e.to_string()),
        });
    }
}
