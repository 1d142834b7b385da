//! Device actor behavior against the mock peripheral.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tentacle_hardware::mock::{MockConnector, MockPeripheralHandle};
use tentacle_hardware::{
    ActorState, Capabilities, Characteristic, ConnectionOptions, DeviceActor, HardwareError,
    NotificationHandler, Profile, ResourceKey, ServiceProfile,
};
use tokio::time::{sleep, timeout};

// generous so paused-clock tests can sit through several backoff delays
const TIMEOUT: Duration = Duration::from_secs(60);

fn profile() -> Profile {
    Profile::new()
        .with_service(
            ServiceProfile::new("180F")
                .with_characteristic(Characteristic::new(
                    "2A19",
                    Capabilities::READ | Capabilities::NOTIFY,
                ))
                .with_characteristic(Characteristic::new("2A1A", Capabilities::INDICATE)),
        )
        .with_service(
            ServiceProfile::new("FFF0")
                .with_characteristic(Characteristic::new("FFF1", Capabilities::READ))
                .with_characteristic(Characteristic::new(
                    "FFF2",
                    Capabilities::WRITE | Capabilities::WRITE_WITHOUT_RESPONSE,
                )),
        )
}

fn spawn(options: ConnectionOptions) -> (DeviceActor, MockPeripheralHandle) {
    let (connector, handle) = MockConnector::new(profile());
    (DeviceActor::spawn("mock", connector, options), handle)
}

fn counting_handler() -> (NotificationHandler, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let handler: NotificationHandler = Arc::new(move |_: &[u8]| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (handler, count)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_lazy_connect_and_read() {
    let (actor, handle) = spawn(ConnectionOptions::default());
    handle.set_value("fff1", vec![0x2a]);
    assert_eq!(actor.state(), ActorState::Idle);
    assert_eq!(handle.connect_count(), 0);

    let value = actor.read(&ResourceKey::new("fff0", "fff1")).await.unwrap();
    assert_eq!(value, vec![0x2a]);
    assert_eq!(actor.state(), ActorState::Connected);

    actor.read(&ResourceKey::characteristic("FFF1")).await.unwrap();
    assert_eq!(handle.connect_count(), 1);
    assert_eq!(handle.read_count(), 2);
}

#[tokio::test]
async fn test_failed_lazy_dial_returns_to_idle() {
    let (actor, handle) = spawn(ConnectionOptions::default());
    handle.fail_next_connects(1);

    let err = actor
        .read(&ResourceKey::characteristic("fff1"))
        .await
        .unwrap_err();
    assert!(matches!(err, HardwareError::Communication { .. }));
    assert_eq!(actor.state(), ActorState::Idle);

    // the next operation dials again straight away
    actor.read(&ResourceKey::characteristic("fff1")).await.unwrap();
    assert_eq!(handle.connect_count(), 2);
}

#[tokio::test]
async fn test_capability_mismatch_does_no_io() {
    let (actor, handle) = spawn(ConnectionOptions::default());
    let (handler, _) = counting_handler();

    let err = actor
        .write(&ResourceKey::characteristic("fff1"), vec![1])
        .await
        .unwrap_err();
    assert!(matches!(err, HardwareError::IncompatibleWrite { .. }));

    let err = actor
        .read(&ResourceKey::characteristic("fff2"))
        .await
        .unwrap_err();
    assert!(matches!(err, HardwareError::IncompatibleRead { .. }));

    let err = actor
        .subscribe(&ResourceKey::characteristic("fff1"), handler)
        .await
        .unwrap_err();
    assert!(err.is_capability_mismatch());
    assert_eq!(err.to_string(), "target characteristic fff1 is not notifiable");

    assert_eq!(handle.read_count(), 0);
    assert!(handle.writes().is_empty());
    assert!(handle.subscriptions().is_empty());
}

#[tokio::test]
async fn test_unknown_targets() {
    let (actor, _handle) = spawn(ConnectionOptions::default());

    let err = actor
        .read(&ResourceKey::new("1800", "2a00"))
        .await
        .unwrap_err();
    assert!(matches!(err, HardwareError::ServiceNotFound { .. }));

    let err = actor
        .read(&ResourceKey::new("fff0", "2a19"))
        .await
        .unwrap_err();
    assert!(matches!(err, HardwareError::CharacteristicNotFound { .. }));
}

#[tokio::test]
async fn test_write_and_subscribe_modes() {
    let (actor, handle) = spawn(
        ConnectionOptions::default()
            .with_only_write_without_response(true)
            .with_only_subscribe_notification(true),
    );
    let (handler, _) = counting_handler();

    actor
        .write(&ResourceKey::characteristic("fff2"), vec![1, 2])
        .await
        .unwrap();
    actor
        .subscribe(&ResourceKey::characteristic("2a1a"), handler)
        .await
        .unwrap();

    let writes = handle.writes();
    assert_eq!(writes.len(), 1);
    assert!(writes[0].without_response);
    assert_eq!(writes[0].data, vec![1, 2]);

    // indicate-only characteristic ignores the notification preference
    let subscriptions = handle.subscriptions();
    assert_eq!(subscriptions.len(), 1);
    assert!(subscriptions[0].indicate);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout() {
    let (actor, handle) =
        spawn(ConnectionOptions::default().with_connect_timeout(Duration::from_secs(10)));
    handle.set_connect_delay(Duration::from_secs(30));

    let err = actor
        .read(&ResourceKey::characteristic("fff1"))
        .await
        .unwrap_err();
    assert_eq!(err, HardwareError::Timeout { duration_ms: 10_000 });
    assert_eq!(actor.state(), ActorState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_backoff_doubles_up_to_cap() {
    let lost = Arc::new(AtomicUsize::new(0));
    let counter = lost.clone();
    let (actor, handle) = spawn(
        ConnectionOptions::default()
            .with_auto_reconnect(true)
            .with_max_reconnect_interval(Duration::from_secs(4))
            .with_connection_lost_handler(Arc::new(move |err: &HardwareError| {
                assert!(matches!(err, HardwareError::ConnectionClosed { .. }));
                counter.fetch_add(1, Ordering::SeqCst);
            })),
    );

    actor.read(&ResourceKey::characteristic("fff1")).await.unwrap();
    handle.fail_next_connects(4);
    handle.simulate_disconnect();

    // initial dial, four refused reconnects, one successful reconnect
    wait_until(|| handle.connect_count() == 6 && handle.is_connected()).await;
    assert_eq!(actor.wait_for_state(ActorState::Connected).await, ActorState::Connected);
    assert_eq!(lost.load(Ordering::SeqCst), 1);

    let times = handle.connect_times();
    let gaps: Vec<_> = times[1..].windows(2).map(|w| w[1] - w[0]).collect();
    let expected = [1, 2, 4, 4].map(Duration::from_secs);
    for (gap, want) in gaps.iter().zip(expected) {
        assert!(
            *gap >= want && *gap < want + Duration::from_millis(50),
            "gap {gap:?}, expected {want:?}"
        );
    }
}

#[tokio::test]
async fn test_subscriptions_replayed_once_after_reconnect() {
    let (actor, handle) = spawn(ConnectionOptions::default().with_auto_reconnect(true));
    let (battery, battery_count) = counting_handler();
    let (alert, _) = counting_handler();

    actor
        .subscribe(&ResourceKey::characteristic("2a19"), battery)
        .await
        .unwrap();
    actor
        .subscribe(&ResourceKey::new("180f", "2a1a"), alert)
        .await
        .unwrap();
    assert_eq!(handle.subscriptions().len(), 2);

    handle.simulate_disconnect();
    wait_until(|| handle.connect_count() == 2 && handle.is_connected()).await;
    actor.wait_for_state(ActorState::Connected).await;

    let subscriptions = handle.subscriptions();
    assert_eq!(subscriptions.len(), 4);
    for uuid in ["2A19", "2A1A"] {
        let count = subscriptions
            .iter()
            .filter(|s| s.characteristic == uuid)
            .count();
        assert_eq!(count, 2, "{uuid} subscribed {count} times");
    }

    assert!(handle.notify("2a19", &[50]));
    assert_eq!(battery_count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_restarts_after_successful_reconnect() {
    let (actor, handle) = spawn(ConnectionOptions::default().with_auto_reconnect(true));
    actor.read(&ResourceKey::characteristic("fff1")).await.unwrap();

    // first outage: two refused reconnects, then success after 1s and 2s
    handle.fail_next_connects(2);
    handle.simulate_disconnect();
    wait_until(|| handle.connect_count() == 4 && handle.is_connected()).await;
    actor.wait_for_state(ActorState::Connected).await;

    // second outage starts again from one second
    handle.fail_next_connects(1);
    handle.simulate_disconnect();
    wait_until(|| handle.connect_count() == 6 && handle.is_connected()).await;
    actor.wait_for_state(ActorState::Connected).await;

    let times = handle.connect_times();
    let gaps: Vec<_> = times.windows(2).map(|w| w[1] - w[0]).collect();
    for (index, want) in [(1, 1), (2, 2), (4, 1)] {
        let want = Duration::from_secs(want);
        assert!(
            gaps[index] >= want && gaps[index] < want + Duration::from_millis(50),
            "gap {index} is {:?}, expected {want:?}",
            gaps[index]
        );
    }
}

#[tokio::test]
async fn test_failed_subscribe_is_replayed_after_reconnect() {
    let (actor, handle) = spawn(ConnectionOptions::default().with_auto_reconnect(true));
    let (battery, battery_count) = counting_handler();

    handle.fail_next_subscribes(1);
    let err = actor
        .subscribe(&ResourceKey::characteristic("2a19"), battery)
        .await
        .unwrap_err();
    assert!(matches!(err, HardwareError::Communication { .. }), "{err}");
    assert!(handle.subscriptions().is_empty());
    assert!(!handle.notify("2a19", &[10]));

    handle.simulate_disconnect();
    wait_until(|| handle.connect_count() == 2 && handle.is_connected()).await;
    actor.wait_for_state(ActorState::Connected).await;

    let subscriptions = handle.subscriptions();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].characteristic, "2A19");
    assert!(handle.notify("2a19", &[50]));
    assert_eq!(battery_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_without_auto_reconnect_next_operation_redials() {
    let (actor, handle) = spawn(ConnectionOptions::default());
    let (handler, _) = counting_handler();

    actor
        .subscribe(&ResourceKey::characteristic("2a19"), handler)
        .await
        .unwrap();
    handle.simulate_disconnect();
    assert_eq!(
        actor.wait_for_state(ActorState::Disconnected).await,
        ActorState::Disconnected
    );
    assert_eq!(handle.connect_count(), 1);

    actor.read(&ResourceKey::characteristic("fff1")).await.unwrap();
    assert_eq!(handle.connect_count(), 2);
    assert_eq!(handle.subscriptions().len(), 2);
}

#[tokio::test]
async fn test_cleared_subscriptions_are_not_replayed() {
    let (actor, handle) = spawn(ConnectionOptions::default());
    let (handler, _) = counting_handler();

    actor
        .subscribe(&ResourceKey::characteristic("2a19"), handler)
        .await
        .unwrap();
    actor.clear_subscriptions().await.unwrap();
    assert!(!handle.notify("2a19", &[1]));

    handle.simulate_disconnect();
    actor.wait_for_state(ActorState::Disconnected).await;
    actor.reconnect().await.unwrap();
    assert_eq!(handle.subscriptions().len(), 1);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let (actor, handle) = spawn(ConnectionOptions::default());
    actor.read(&ResourceKey::characteristic("fff1")).await.unwrap();

    actor.close().await.unwrap();
    actor.close().await.unwrap();
    assert_eq!(handle.cancel_count(), 1);
    assert_eq!(actor.state(), ActorState::Closed);

    let err = actor
        .read(&ResourceKey::characteristic("fff1"))
        .await
        .unwrap_err();
    assert!(matches!(err, HardwareError::ActorClosed { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_pending_dial() {
    let (actor, handle) =
        spawn(ConnectionOptions::default().with_connect_timeout(Duration::from_secs(120)));
    handle.set_connect_delay(Duration::from_secs(60));
    let actor = Arc::new(actor);

    let reader = actor.clone();
    let pending =
        tokio::spawn(async move { reader.read(&ResourceKey::characteristic("fff1")).await });
    sleep(Duration::from_secs(1)).await;
    assert_eq!(actor.state(), ActorState::Connecting);

    actor.close().await.unwrap();
    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, HardwareError::ActorClosed { .. }));
    assert_eq!(handle.cancel_count(), 0);
}
