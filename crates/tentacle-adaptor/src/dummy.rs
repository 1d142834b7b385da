//! Dummy adaptor: a simulated fan.
//!
//! Turning the fan on sets the rotating speed of the requested gear, after
//! which a simulation task spins it up by one every tick until the gear's
//! ceiling is reached.
//!
//! | Gear | Initial speed | Tick | Ceiling |
//! |---|---|---|---|
//! | `slow` | 0 | 3s | 100 |
//! | `middle` | 100 | 2s | 200 |
//! | `fast` | 200 | 1s | 300 |

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tentacle_core::LinkKey;
use tentacle_protocol::DeviceObject;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::device::{Adaptor, Device, Parameters, StatusReporter};
use crate::error::{AdaptorError, Result};

pub const ADAPTOR_NAME: &str = "dummy";
pub const GROUP_VERSION: &str = "devices.tentacle.io/v1alpha1";
pub const KIND: &str = "DummyDevice";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gear {
    Slow,
    Middle,
    Fast,
}

impl Gear {
    fn initial_speed(self) -> i32 {
        match self {
            Gear::Slow => 0,
            Gear::Middle => 100,
            Gear::Fast => 200,
        }
    }

    fn max_speed(self) -> i32 {
        match self {
            Gear::Slow => 100,
            Gear::Middle => 200,
            Gear::Fast => 300,
        }
    }

    fn tick(self) -> Duration {
        match self {
            Gear::Slow => Duration::from_secs(3),
            Gear::Middle => Duration::from_secs(2),
            Gear::Fast => Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DummySpec {
    #[serde(default)]
    pub on: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gear: Option<Gear>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DummyStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gear: Option<Gear>,
    #[serde(default)]
    pub rotating_speed: i32,
}

/// Link parameters of a dummy device.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DummyParameters {
    /// Address of the simulated device, if any
    #[serde(default)]
    pub ip: Option<String>,
}

impl Parameters for DummyParameters {
    fn validate(&self) -> Result<()> {
        if let Some(ip) = &self.ip {
            ip.parse::<IpAddr>().map_err(|_| {
                AdaptorError::invalid_parameters(format!("ip {ip:?} is not an IP address"))
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DummyAdaptor;

impl Adaptor for DummyAdaptor {
    type Device = DummyDevice;

    fn create_device(&self, key: LinkKey, reporter: StatusReporter) -> DummyDevice {
        DummyDevice::new(key, reporter)
    }
}

pub struct DummyDevice {
    key: LinkKey,
    reporter: StatusReporter,
    status: Arc<Mutex<DummyStatus>>,
    // cancels the simulation of the current gear
    spinning: Option<CancellationToken>,
}

impl DummyDevice {
    pub fn new(key: LinkKey, reporter: StatusReporter) -> Self {
        Self {
            key,
            reporter,
            status: Arc::new(Mutex::new(DummyStatus::default())),
            spinning: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> DummyStatus {
        lock(&self.status).clone()
    }

    fn on(&mut self, gear: Option<Gear>) {
        let mut status = lock(&self.status);
        if status.gear == gear {
            return;
        }
        stop_spinning(&mut self.spinning);

        status.gear = gear;
        status.rotating_speed = gear.map_or(0, Gear::initial_speed);
        publish(&self.key, &self.reporter, &status);
        drop(status);

        if let Some(gear) = gear {
            let stop = CancellationToken::new();
            tokio::spawn(spin(
                self.key.clone(),
                self.reporter.clone(),
                self.status.clone(),
                gear,
                stop.clone(),
            ));
            self.spinning = Some(stop);
        }
    }

    fn off(&mut self) {
        let mut status = lock(&self.status);
        stop_spinning(&mut self.spinning);
        status.gear = None;
        status.rotating_speed = 0;
        publish(&self.key, &self.reporter, &status);
    }
}

impl Device for DummyDevice {
    type Parameters = DummyParameters;

    async fn configure(&mut self, _parameters: DummyParameters, device: DeviceObject) -> Result<()> {
        let spec: DummySpec = device
            .spec_as()
            .map_err(|e| AdaptorError::invalid_device(format!("failed to decode spec: {e}")))?;
        if spec.on {
            self.on(spec.gear);
        } else {
            self.off();
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.off();
        info!(link = %self.key, "Closed connection");
    }
}

async fn spin(
    key: LinkKey,
    reporter: StatusReporter,
    status: Arc<Mutex<DummyStatus>>,
    gear: Gear,
    stop: CancellationToken,
) {
    debug!(link = %key, ?gear, "Mocking started");
    let mut ticker = interval_at(Instant::now() + gear.tick(), gear.tick());
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let mut current = lock(&status);
        // a newer configuration won the lock first
        if stop.is_cancelled() {
            break;
        }
        if current.rotating_speed < gear.max_speed() {
            current.rotating_speed += 1;
        }
        if !publish(&key, &reporter, &current) {
            break;
        }
    }
    debug!(link = %key, ?gear, "Mocking finished");
}

fn stop_spinning(spinning: &mut Option<CancellationToken>) {
    if let Some(stop) = spinning.take() {
        stop.cancel();
    }
}

fn publish(key: &LinkKey, reporter: &StatusReporter, status: &DummyStatus) -> bool {
    let mut observed = DeviceObject::new(GROUP_VERSION, KIND, key);
    if let Err(e) = observed.set_status(status) {
        warn!(link = %key, error = %e, "Failed to encode status");
        return true;
    }
    reporter.report(observed)
}

fn lock(status: &Mutex<DummyStatus>) -> MutexGuard<'_, DummyStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Report;
    use rstest::rstest;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn device() -> (DummyDevice, UnboundedReceiver<Report>) {
        let (reporter, reports) = StatusReporter::channel();
        let key = LinkKey::new("default", "living-room-fan").unwrap();
        (DummyDevice::new(key, reporter), reports)
    }

    fn desired(spec: serde_json::Value) -> DeviceObject {
        let key = LinkKey::new("default", "living-room-fan").unwrap();
        let mut object = DeviceObject::new(GROUP_VERSION, KIND, &key);
        object.spec = spec;
        object
    }

    async fn next_status(reports: &mut UnboundedReceiver<Report>) -> DummyStatus {
        match reports.recv().await {
            Some(Report::Device(observed)) => {
                assert_eq!(observed.kind, KIND);
                assert_eq!(observed.metadata.name, "living-room-fan");
                observed.status_as().unwrap()
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[rstest]
    #[case::slow("slow", 0)]
    #[case::middle("middle", 100)]
    #[case::fast("fast", 200)]
    #[tokio::test]
    async fn test_initial_speed_per_gear(#[case] gear: &str, #[case] speed: i32) {
        let (mut dummy, mut reports) = device();
        dummy
            .configure(Default::default(), desired(json!({"on": true, "gear": gear})))
            .await
            .unwrap();

        let status = next_status(&mut reports).await;
        assert_eq!(status.rotating_speed, speed);
        assert_eq!(serde_json::to_value(status.gear).unwrap(), json!(gear));
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_grows_every_tick() {
        let (mut dummy, mut reports) = device();
        dummy
            .configure(Default::default(), desired(json!({"on": true, "gear": "fast"})))
            .await
            .unwrap();

        assert_eq!(next_status(&mut reports).await.rotating_speed, 200);
        assert_eq!(next_status(&mut reports).await.rotating_speed, 201);
        assert_eq!(next_status(&mut reports).await.rotating_speed, 202);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_gear_is_noop_and_off_resets() {
        let (mut dummy, mut reports) = device();
        let middle = desired(json!({"on": true, "gear": "middle"}));
        dummy.configure(Default::default(), middle.clone()).await.unwrap();
        next_status(&mut reports).await;

        dummy.configure(Default::default(), middle).await.unwrap();
        assert!(reports.try_recv().is_err());

        dummy
            .configure(Default::default(), desired(json!({"on": false})))
            .await
            .unwrap();
        let status = next_status(&mut reports).await;
        assert_eq!(status, DummyStatus::default());

        // no simulation left running
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(reports.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_turns_off() {
        let (mut dummy, mut reports) = device();
        dummy
            .configure(Default::default(), desired(json!({"on": true, "gear": "slow"})))
            .await
            .unwrap();
        next_status(&mut reports).await;

        dummy.shutdown().await;
        assert_eq!(next_status(&mut reports).await, DummyStatus::default());
        assert_eq!(dummy.status(), DummyStatus::default());
    }

    #[rstest]
    #[case::absent(r#"{}"#, true)]
    #[case::v4(r#"{"ip":"192.168.1.10"}"#, true)]
    #[case::v6(r#"{"ip":"fe80::1"}"#, true)]
    #[case::hostname(r#"{"ip":"fan.local"}"#, false)]
    fn test_parameters_validation(#[case] raw: &str, #[case] valid: bool) {
        let parameters: DummyParameters = serde_json::from_str(raw).unwrap();
        assert_eq!(parameters.validate().is_ok(), valid);
    }
}
