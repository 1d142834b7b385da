//! Mock peripheral for testing and development.
//!
//! [`MockConnector`] hands out [`MockPeripheral`] clients over a fixed
//! profile. The paired [`MockPeripheralHandle`] seeds values, drops the link,
//! refuses dials or subscriptions, pushes notifications and reports every
//! call the actor made.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{HardwareError, Result};
use crate::traits::{Connector, NotificationHandler, PeripheralClient};
use crate::types::{Characteristic, Profile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub characteristic: String,
    pub data: Vec<u8>,
    pub without_response: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRecord {
    pub characteristic: String,
    pub indicate: bool,
}

#[derive(Default)]
struct MockState {
    connects: AtomicUsize,
    reads: AtomicUsize,
    cancels: AtomicUsize,
    failing_connects: AtomicUsize,
    failing_subscribes: AtomicUsize,
    connect_delay: Mutex<Duration>,
    connect_times: Mutex<Vec<Instant>>,
    values: Mutex<HashMap<String, Vec<u8>>>,
    writes: Mutex<Vec<WriteRecord>>,
    subscriptions: Mutex<Vec<SubscribeRecord>>,
    handlers: Mutex<HashMap<String, NotificationHandler>>,
    link: Mutex<Option<CancellationToken>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// consumes one pending failure, if any
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn uuid_key(uuid: &str) -> String {
    uuid.to_ascii_uppercase()
}

/// Dials mock peripherals.
///
/// # Examples
///
/// ```
/// use tentacle_hardware::mock::MockConnector;
/// use tentacle_hardware::{Capabilities, Characteristic, Profile, ServiceProfile};
///
/// let profile = Profile::new().with_service(
///     ServiceProfile::new("180F")
///         .with_characteristic(Characteristic::new("2A19", Capabilities::READ)),
/// );
/// let (connector, handle) = MockConnector::new(profile);
/// handle.set_value("2a19", vec![87]);
/// ```
#[derive(Clone)]
pub struct MockConnector {
    profile: Profile,
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn new(profile: Profile) -> (Self, MockPeripheralHandle) {
        let state = Arc::new(MockState::default());
        let connector = Self {
            profile,
            state: state.clone(),
        };
        (connector, MockPeripheralHandle { state })
    }
}

impl Connector for MockConnector {
    type Client = MockPeripheral;

    async fn connect(&self) -> Result<MockPeripheral> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.connect_times).push(Instant::now());

        let delay = *lock(&self.state.connect_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if take_one(&self.state.failing_connects) {
            return Err(HardwareError::communication(
                "mock peripheral refused the connection",
            ));
        }

        let link = CancellationToken::new();
        *lock(&self.state.link) = Some(link.clone());
        Ok(MockPeripheral {
            profile: self.profile.clone(),
            state: self.state.clone(),
            link,
        })
    }
}

/// Client bound to one mock link.
pub struct MockPeripheral {
    profile: Profile,
    state: Arc<MockState>,
    link: CancellationToken,
}

impl MockPeripheral {
    fn check_link(&self) -> Result<()> {
        if self.link.is_cancelled() {
            return Err(HardwareError::connection_closed("mock"));
        }
        Ok(())
    }
}

impl PeripheralClient for MockPeripheral {
    fn profile(&self) -> Option<&Profile> {
        Some(&self.profile)
    }

    async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>> {
        self.check_link()?;
        self.state.reads.fetch_add(1, Ordering::SeqCst);
        let values = lock(&self.state.values);
        Ok(values
            .get(&uuid_key(&characteristic.uuid))
            .cloned()
            .unwrap_or_default())
    }

    async fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
        without_response: bool,
    ) -> Result<()> {
        self.check_link()?;
        lock(&self.state.writes).push(WriteRecord {
            characteristic: uuid_key(&characteristic.uuid),
            data: data.to_vec(),
            without_response,
        });
        lock(&self.state.values).insert(uuid_key(&characteristic.uuid), data.to_vec());
        Ok(())
    }

    async fn subscribe(
        &self,
        characteristic: &Characteristic,
        indicate: bool,
        handler: NotificationHandler,
    ) -> Result<()> {
        self.check_link()?;
        if take_one(&self.state.failing_subscribes) {
            return Err(HardwareError::communication(
                "mock peripheral rejected the subscription",
            ));
        }
        lock(&self.state.subscriptions).push(SubscribeRecord {
            characteristic: uuid_key(&characteristic.uuid),
            indicate,
        });
        lock(&self.state.handlers).insert(uuid_key(&characteristic.uuid), handler);
        Ok(())
    }

    async fn clear_subscriptions(&self) -> Result<()> {
        self.check_link()?;
        lock(&self.state.handlers).clear();
        Ok(())
    }

    fn disconnected(&self) -> CancellationToken {
        self.link.clone()
    }

    async fn cancel_connection(&self) -> Result<()> {
        self.state.cancels.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.handlers).clear();
        self.link.cancel();
        Ok(())
    }
}

/// Controls a [`MockConnector`] and inspects what its clients were asked.
#[derive(Clone)]
pub struct MockPeripheralHandle {
    state: Arc<MockState>,
}

impl MockPeripheralHandle {
    /// Drop the live link as if the peripheral went out of range.
    pub fn simulate_disconnect(&self) {
        lock(&self.state.handlers).clear();
        if let Some(link) = lock(&self.state.link).take() {
            link.cancel();
        }
    }

    /// Refuse the next `count` dials.
    pub fn fail_next_connects(&self, count: usize) {
        self.state.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Reject the next `count` subscribe calls on any link.
    pub fn fail_next_subscribes(&self, count: usize) {
        self.state.failing_subscribes.store(count, Ordering::SeqCst);
    }

    /// Make every dial take `delay` before answering.
    pub fn set_connect_delay(&self, delay: Duration) {
        *lock(&self.state.connect_delay) = delay;
    }

    pub fn set_value(&self, characteristic: &str, value: Vec<u8>) {
        lock(&self.state.values).insert(uuid_key(characteristic), value);
    }

    #[must_use]
    pub fn value(&self, characteristic: &str) -> Option<Vec<u8>> {
        lock(&self.state.values).get(&uuid_key(characteristic)).cloned()
    }

    /// Push a notification to the subscriber of `characteristic`.
    ///
    /// Returns `false` when nobody is subscribed on the live link.
    pub fn notify(&self, characteristic: &str, payload: &[u8]) -> bool {
        let handler = lock(&self.state.handlers)
            .get(&uuid_key(characteristic))
            .cloned();
        match handler {
            Some(handler) => {
                handler(payload);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        lock(&self.state.link)
            .as_ref()
            .is_some_and(|link| !link.is_cancelled())
    }

    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Instants at which each dial started.
    #[must_use]
    pub fn connect_times(&self) -> Vec<Instant> {
        lock(&self.state.connect_times).clone()
    }

    #[must_use]
    pub fn read_count(&self) -> usize {
        self.state.reads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn cancel_count(&self) -> usize {
        self.state.cancels.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn writes(&self) -> Vec<WriteRecord> {
        lock(&self.state.writes).clone()
    }

    #[must_use]
    pub fn subscriptions(&self) -> Vec<SubscribeRecord> {
        lock(&self.state.subscriptions).clone()
    }
}
