//! Property-driven peripheral devices.
//!
//! A peripheral device object declares a connection `protocol` and a list of
//! `properties`. Each property is bound to one characteristic through its
//! visitor and is read, written or subscribed according to its access
//! modes. The device drives the link through a [`DeviceActor`], so dialing,
//! capability checks and reconnection live in `tentacle-hardware`.
//!
//! # Access modes
//!
//! | Mode | Applied |
//! |---|---|
//! | `Notify` | subscribed whenever the property list changes |
//! | `WriteOnce` | written when the property itself changes |
//! | `WriteMany` | written whenever the property list changes and on every sync tick |
//! | `ReadOnce` | read when the property itself changes |
//! | `ReadMany` | read whenever the property list changes and on every sync tick (default) |
//!
//! `WriteMany` supersedes `WriteOnce` and `ReadMany` supersedes `ReadOnce`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tentacle_core::LinkKey;
use tentacle_hardware::{
    ConnectionOptions, Connector, DeviceActor, HardwareError, NotificationHandler, ResourceKey,
};
use tentacle_protocol::DeviceObject;
use tentacle_protocol::value::{
    ArithmeticOperation, ByteOrder, DEFAULT_PRECISION, ValueType, apply_operations,
};
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::device::{Adaptor, Device, NoParameters, StatusReporter};
use crate::error::{AdaptorError, Result};

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);

// ============================================================================
// Device object schema
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    Notify,
    WriteOnce,
    WriteMany,
    ReadOnce,
    ReadMany,
}

const NOTIFY: u8 = 0x10;
const WRITE_MANY: u8 = 0x08;
const WRITE_ONCE: u8 = 0x04;
const READ_MANY: u8 = 0x02;
const READ_ONCE: u8 = 0x01;

/// Collapse declared access modes into the ordered list to apply.
///
/// `Notify` comes first, then the write mode, then the read mode. An empty
/// declaration means `ReadMany`.
pub fn merge_access_modes(declared: &[AccessMode]) -> Vec<AccessMode> {
    if declared.is_empty() {
        return vec![AccessMode::ReadMany];
    }

    let mut bits = declared.iter().fold(0u8, |bits, mode| {
        bits | match mode {
            AccessMode::Notify => NOTIFY,
            AccessMode::WriteMany => WRITE_MANY,
            AccessMode::WriteOnce => WRITE_ONCE,
            AccessMode::ReadMany => READ_MANY,
            AccessMode::ReadOnce => READ_ONCE,
        }
    });
    if bits & WRITE_MANY != 0 {
        bits &= !WRITE_ONCE;
    }
    if bits & READ_MANY != 0 {
        bits &= !READ_ONCE;
    }

    [
        (NOTIFY, AccessMode::Notify),
        (WRITE_MANY, AccessMode::WriteMany),
        (WRITE_ONCE, AccessMode::WriteOnce),
        (READ_MANY, AccessMode::ReadMany),
        (READ_ONCE, AccessMode::ReadOnce),
    ]
    .into_iter()
    .filter(|(bit, _)| bits & bit != 0)
    .map(|(_, mode)| mode)
    .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Value travels as UTF-8 text.
    Text,
    #[default]
    Bytes,
}

/// Where and how a property is reached on the peripheral.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visitor {
    #[serde(default)]
    pub service: String,
    pub characteristic: String,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub endianness: ByteOrder,
    #[serde(default)]
    pub arithmetic_operations: Vec<ArithmeticOperation>,
    #[serde(default)]
    pub arithmetic_operation_precision: Option<usize>,
}

impl Visitor {
    #[must_use]
    pub fn resource(&self) -> ResourceKey {
        ResourceKey::new(&self.service, &self.characteristic)
    }

    #[must_use]
    pub fn precision(&self) -> usize {
        self.arithmetic_operation_precision
            .unwrap_or(DEFAULT_PRECISION)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub access_modes: Vec<AccessMode>,
    pub visitor: Visitor,
    /// Value written by the write modes.
    #[serde(default)]
    pub value: String,
}

impl Property {
    #[must_use]
    pub fn merged_access_modes(&self) -> Vec<AccessMode> {
        merge_access_modes(&self.access_modes)
    }

    /// Wire bytes of the configured value.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.visitor.content_type == ContentType::Text {
            return Ok(self.value.as_bytes().to_vec());
        }
        Ok(self.value_type.encode(self.visitor.endianness, &self.value)?)
    }

    /// Decode wire bytes into the value and the arithmetic result.
    pub fn decode(&self, data: &[u8]) -> Result<(String, Option<String>)> {
        let visitor = &self.visitor;
        if visitor.content_type == ContentType::Text {
            let text = String::from_utf8_lossy(data);
            let value = text
                .strip_prefix('"')
                .and_then(|t| t.strip_suffix('"'))
                .unwrap_or(text.as_ref())
                .to_string();
            if !self.value_type.is_arithmetic() {
                return Ok((value, None));
            }
            let raw: f64 = value.trim().parse().map_err(|_| {
                AdaptorError::device(format!("failed to parse raw string {value:?} as a number"))
            })?;
            let result =
                apply_operations(raw, &visitor.arithmetic_operations, visitor.precision())?;
            return Ok((value, result));
        }

        let decoded = self.value_type.decode(visitor.endianness, data)?;
        let result = match decoded.number {
            Some(raw) => apply_operations(raw, &visitor.arithmetic_operations, visitor.precision())?,
            None => None,
        };
        Ok((decoded.text, result))
    }
}

/// Connection settings of a peripheral.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeripheralProtocol {
    /// Address or name the connector dials
    pub endpoint: String,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub connect_timeout: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub sync_interval: Option<Duration>,
    #[serde(default)]
    pub auto_reconnect: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub max_reconnect_interval: Option<Duration>,
    #[serde(default)]
    pub only_subscribe_notification_value: bool,
    #[serde(default)]
    pub only_write_value_without_response: bool,
}

impl PeripheralProtocol {
    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        self.sync_interval
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_SYNC_INTERVAL)
    }

    #[must_use]
    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect.unwrap_or(true)
    }

    /// Actor options, without the connection-lost handler.
    #[must_use]
    pub fn connection_options(&self) -> ConnectionOptions {
        let mut options = ConnectionOptions::default()
            .with_auto_reconnect(self.auto_reconnect())
            .with_only_subscribe_notification(self.only_subscribe_notification_value)
            .with_only_write_without_response(self.only_write_value_without_response);
        if let Some(timeout) = self.connect_timeout.filter(|d| !d.is_zero()) {
            options = options.with_connect_timeout(timeout);
        }
        if let Some(interval) = self.max_reconnect_interval.filter(|d| !d.is_zero()) {
            options = options.with_max_reconnect_interval(interval);
        }
        options
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PeripheralSpec {
    #[serde(default)]
    pub protocol: PeripheralProtocol,
    #[serde(default)]
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusProperty {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<AccessMode>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusProperty {
    fn of(property: &Property) -> Self {
        Self {
            name: property.name.clone(),
            value_type: property.value_type,
            access_modes: property.access_modes.clone(),
            value: String::new(),
            operation_result: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeripheralStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<StatusProperty>,
}

/// Accepts Go-style duration strings such as `"500ms"`, `"10s"` or `"1m30s"`.
///
/// Units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`; negative values are rejected.
fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(text) => parse_duration(text).map(Some).map_err(serde::de::Error::custom),
    }
}

pub fn parse_duration(text: &str) -> std::result::Result<Duration, String> {
    let mut total = Duration::ZERO;
    let mut rest = text.trim();
    if rest.is_empty() {
        return Err("empty duration".to_string());
    }

    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| format!("missing unit in duration {text:?}"))?;
        let amount: f64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid duration {text:?}"))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            unit => return Err(format!("unknown unit {unit:?} in duration {text:?}")),
        };
        let nanos = (amount * unit_nanos).round();
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return Err(format!("duration {text:?} is out of range"));
        }
        total = total
            .checked_add(Duration::from_nanos(nanos as u64))
            .ok_or_else(|| format!("duration {text:?} is out of range"))?;
        rest = &rest[unit_len..];
    }
    Ok(total)
}

// ============================================================================
// Adaptor
// ============================================================================

/// Builds the connector for a peripheral from its protocol settings.
pub trait ConnectorFactory: Send + Sync + 'static {
    type Connector: Connector;

    fn connector(&self, protocol: &PeripheralProtocol) -> Result<Self::Connector>;
}

pub struct PeripheralAdaptor<F: ConnectorFactory> {
    factory: Arc<F>,
}

impl<F: ConnectorFactory> PeripheralAdaptor<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
        }
    }
}

impl<F: ConnectorFactory> Adaptor for PeripheralAdaptor<F> {
    type Device = PeripheralDevice<F>;

    fn create_device(&self, key: LinkKey, reporter: StatusReporter) -> PeripheralDevice<F> {
        PeripheralDevice::new(key, self.factory.clone(), reporter)
    }
}

// ============================================================================
// Device
// ============================================================================

struct Notification {
    index: usize,
    data: Vec<u8>,
}

#[derive(Default)]
struct Inner {
    actor: Option<Arc<DeviceActor>>,
    /// Last desired object, the envelope of every report.
    object: DeviceObject,
    /// Spec as applied.
    spec: PeripheralSpec,
    status: PeripheralStatus,
}

impl Inner {
    fn actor(&self) -> Result<Arc<DeviceActor>> {
        self.actor
            .clone()
            .ok_or_else(|| AdaptorError::device("peripheral is not configured"))
    }

    fn report(&self, reporter: &StatusReporter) {
        let mut observed = self.object.clone();
        if let Err(e) = observed.set_status(&self.status) {
            warn!(error = %e, "Failed to encode peripheral status");
            return;
        }
        reporter.report(observed);
        debug!("Synced");
    }
}

/// One peripheral behind one Connect stream.
pub struct PeripheralDevice<F: ConnectorFactory> {
    key: LinkKey,
    factory: Arc<F>,
    reporter: StatusReporter,
    inner: Arc<Mutex<Inner>>,
    // stops the sync task of the current property list
    syncing: Option<CancellationToken>,
}

impl<F: ConnectorFactory> PeripheralDevice<F> {
    pub fn new(key: LinkKey, factory: Arc<F>, reporter: StatusReporter) -> Self {
        Self {
            key,
            factory,
            reporter,
            inner: Arc::new(Mutex::new(Inner::default())),
            syncing: None,
        }
    }

    /// Spawn a fresh actor for `protocol`, closing the previous one.
    async fn reconnect(&self, inner: &mut Inner, protocol: &PeripheralProtocol) -> Result<()> {
        if let Some(actor) = inner.actor.take()
            && let Err(e) = actor.close().await
        {
            error!(link = %self.key, error = %e, "Error closing peripheral connection");
        }

        let connector = self.factory.connector(protocol)?;
        let auto_reconnect = protocol.auto_reconnect();
        let reporter = self.reporter.clone();
        let key = self.key.clone();
        let options = protocol
            .connection_options()
            .with_connection_lost_handler(Arc::new(move |err: &HardwareError| {
                if auto_reconnect {
                    error!(
                        link = %key,
                        error = %err,
                        "Peripheral connection is closed, turn off autoReconnect to report it"
                    );
                    return;
                }
                let message = match err {
                    HardwareError::ConnectionClosed { .. } => {
                        "peripheral connection is closed".to_string()
                    }
                    other => format!("error for peripheral connection: {other}"),
                };
                reporter.report_error(message);
            }));

        inner.actor = Some(Arc::new(DeviceActor::spawn(
            self.key.to_string(),
            connector,
            options,
        )));
        // everything is applied again on the new link
        inner.spec = PeripheralSpec::default();
        Ok(())
    }

    async fn refresh(&mut self, inner: &mut Inner, desired: PeripheralSpec) -> Result<()> {
        let actor = inner.actor()?;

        if inner.spec.properties != desired.properties || self.syncing.is_none() {
            self.stop_sync(&actor, &inner.spec).await;

            let stale_specs: HashMap<&str, &Property> = inner
                .spec
                .properties
                .iter()
                .map(|p| (p.name.as_str(), p))
                .collect();
            let mut stale_status: HashMap<String, StatusProperty> = inner
                .status
                .properties
                .drain(..)
                .map(|p| (p.name.clone(), p))
                .collect();

            let (notifications, queue) = mpsc::unbounded_channel();
            let mut properties = Vec::with_capacity(desired.properties.len());
            for (index, property) in desired.properties.iter().enumerate() {
                let mut status = stale_status
                    .remove(&property.name)
                    .unwrap_or_else(|| StatusProperty::of(property));
                let changed = stale_specs.get(property.name.as_str()) != Some(&property);

                for mode in property.merged_access_modes() {
                    status = match mode {
                        AccessMode::Notify => {
                            let tx = notifications.clone();
                            let handler: NotificationHandler = Arc::new(move |data: &[u8]| {
                                let _ = tx.send(Notification {
                                    index,
                                    data: data.to_vec(),
                                });
                            });
                            subscribe_property(&actor, property, handler)
                                .await
                                .map_err(|e| fail("notify", property, e))?
                        }
                        AccessMode::WriteOnce if !changed => status,
                        AccessMode::WriteOnce | AccessMode::WriteMany => {
                            write_property(&actor, property, status.updated_at)
                                .await
                                .map_err(|e| fail("write", property, e))?
                        }
                        AccessMode::ReadOnce if !changed => status,
                        AccessMode::ReadOnce | AccessMode::ReadMany => {
                            read_property(&actor, property)
                                .await
                                .map_err(|e| fail("read", property, e))?
                        }
                    };
                }
                properties.push(status);
            }
            inner.status.properties = properties;
            self.start_sync(desired.protocol.sync_interval(), queue);
        }

        inner.spec = desired;
        inner.report(&self.reporter);
        Ok(())
    }

    fn start_sync(&mut self, interval: Duration, queue: mpsc::UnboundedReceiver<Notification>) {
        let stop = CancellationToken::new();
        tokio::spawn(sync(
            self.key.clone(),
            self.inner.clone(),
            self.reporter.clone(),
            interval,
            queue,
            stop.clone(),
        ));
        self.syncing = Some(stop);
    }

    async fn stop_sync(&mut self, actor: &DeviceActor, applied: &PeripheralSpec) {
        if let Some(stop) = self.syncing.take() {
            stop.cancel();
        }

        let subscribed = applied
            .properties
            .iter()
            .any(|p| p.merged_access_modes().contains(&AccessMode::Notify));
        if subscribed
            && let Err(e) = actor.clear_subscriptions().await
            && !matches!(e, HardwareError::ConnectionClosed { .. })
        {
            error!(link = %self.key, error = %e, "Failed to unsubscribe all characteristics");
        }
    }
}

impl<F: ConnectorFactory> Device for PeripheralDevice<F> {
    type Parameters = NoParameters;

    async fn configure(&mut self, _parameters: NoParameters, device: DeviceObject) -> Result<()> {
        let desired: PeripheralSpec = device
            .spec_as()
            .map_err(|e| AdaptorError::invalid_device(format!("failed to decode spec: {e}")))?;

        let inner = self.inner.clone();
        let mut inner = inner.lock().await;
        inner.object = device;

        if inner.actor.is_none() || inner.spec.protocol != desired.protocol {
            // the sync task belongs to the old link
            if let Some(stop) = self.syncing.take() {
                stop.cancel();
            }
            self.reconnect(&mut inner, &desired.protocol).await?;
            info!(link = %self.key, endpoint = %desired.protocol.endpoint, "Peripheral connection configured");
        }

        self.refresh(&mut inner, desired).await
    }

    async fn shutdown(&mut self) {
        if let Some(stop) = self.syncing.take() {
            stop.cancel();
        }
        let actor = self.inner.lock().await.actor.take();
        if let Some(actor) = actor
            && let Err(e) = actor.close().await
        {
            error!(link = %self.key, error = %e, "Error closing peripheral connection");
        }
        info!(link = %self.key, "Shutdown");
    }
}

fn fail(action: &str, property: &Property, err: AdaptorError) -> AdaptorError {
    AdaptorError::device(format!("failed to {action} property {}: {err}", property.name))
}

async fn write_property(
    actor: &DeviceActor,
    property: &Property,
    mut updated_at: Option<DateTime<Utc>>,
) -> Result<StatusProperty> {
    if !property.value.is_empty() {
        let data = property.encode()?;
        actor.write(&property.visitor.resource(), data).await?;
        debug!(property = %property.name, value = %property.value, "Write property");
        updated_at = Some(Utc::now());
    }

    Ok(StatusProperty {
        updated_at: updated_at.or_else(|| Some(Utc::now())),
        ..StatusProperty::of(property)
    })
}

async fn read_property(actor: &DeviceActor, property: &Property) -> Result<StatusProperty> {
    let data = actor.read(&property.visitor.resource()).await?;
    decoded_status(property, &data)
}

async fn subscribe_property(
    actor: &DeviceActor,
    property: &Property,
    handler: NotificationHandler,
) -> Result<StatusProperty> {
    actor.subscribe(&property.visitor.resource(), handler).await?;
    Ok(StatusProperty {
        updated_at: Some(Utc::now()),
        ..StatusProperty::of(property)
    })
}

fn decoded_status(property: &Property, data: &[u8]) -> Result<StatusProperty> {
    let (value, operation_result) = property.decode(data)?;
    debug!(property = %property.name, %value, ?operation_result, "Read property");
    Ok(StatusProperty {
        value,
        operation_result,
        updated_at: Some(Utc::now()),
        ..StatusProperty::of(property)
    })
}

/// Apply notifications as they arrive and refresh the `*Many` properties
/// every `interval`.
async fn sync(
    key: LinkKey,
    inner: Arc<Mutex<Inner>>,
    reporter: StatusReporter,
    interval: Duration,
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    stop: CancellationToken,
) {
    debug!(link = %key, ?interval, "Fetching");
    let mut ticker = interval_at(Instant::now() + interval, interval);
    loop {
        let notification = tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => None,
            Some(notification) = notifications.recv() => Some(notification),
        };

        let mut inner = inner.lock().await;
        // a newer configuration took the lock first
        if stop.is_cancelled() {
            break;
        }
        match notification {
            Some(notification) => apply_notification(&key, &mut inner, notification),
            None => sync_many(&key, &mut inner).await,
        }
        inner.report(&reporter);
    }
    debug!(link = %key, "Finished fetching");
}

fn apply_notification(key: &LinkKey, inner: &mut Inner, notification: Notification) {
    let Inner { spec, status, .. } = inner;
    let (Some(property), Some(slot)) = (
        spec.properties.get(notification.index),
        status.properties.get_mut(notification.index),
    ) else {
        return;
    };

    match decoded_status(property, &notification.data) {
        Ok(updated) => *slot = updated,
        Err(e) => {
            error!(link = %key, property = %property.name, error = %e, "Error converting the notified value");
        }
    }
}

async fn sync_many(key: &LinkKey, inner: &mut Inner) {
    let Ok(actor) = inner.actor() else {
        return;
    };
    let Inner { spec, status, .. } = inner;
    if spec.properties.len() != status.properties.len() {
        return;
    }

    for (property, slot) in spec.properties.iter().zip(status.properties.iter_mut()) {
        for mode in property.merged_access_modes() {
            let updated = match mode {
                AccessMode::WriteMany => write_property(&actor, property, slot.updated_at).await,
                AccessMode::ReadMany => read_property(&actor, property).await,
                _ => continue,
            };
            match updated {
                Ok(updated) => *slot = updated,
                Err(e) => {
                    error!(link = %key, property = %property.name, ?mode, error = %e, "Error syncing property");
                }
            }
        }
    }
}
