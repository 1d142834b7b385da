//! Integration tests for the registration service and connection pools
//!
//! A minimal adaptor is played by a socket listener in a temporary
//! directory: it drains KeepAlive streams and echoes Connect requests back
//! with a status section.

use futures::{SinkExt, StreamExt};
use rstest::rstest;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tentacle_core::{AdaptorIdentity, DeviceLinkRef, LinkKey};
use tentacle_hub::{
    ChannelObserver, HubConfig, HubError, HubEvent, PoolManager, RegistrationEvent,
    RegistrationServer,
};
use tentacle_network::{
    FrameStream, SocketListener, open_stream, read_preface, recv_frame,
};
use tentacle_protocol::{ConnectResponse, DeviceObject, Frame, Service, StatusCode};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);

struct FakeAdaptor {
    connects: Arc<AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl FakeAdaptor {
    fn start(dir: &Path, endpoint: &str) -> Self {
        let listener = SocketListener::bind(dir.join(endpoint)).unwrap();
        let connects = Arc::new(AtomicUsize::new(0));
        let counter = connects.clone();
        let task = tokio::spawn(async move {
            loop {
                let Ok(stream) = listener.accept().await else {
                    return;
                };
                let counter = counter.clone();
                tokio::spawn(async move { serve(stream, counter).await });
            }
        });
        Self { connects, task }
    }

    /// Stop accepting and remove the socket file.
    fn stop(self) {
        self.task.abort();
    }
}

async fn serve(mut stream: FrameStream, connects: Arc<AtomicUsize>) {
    match read_preface(&mut stream, TIMEOUT).await {
        Ok(Service::KeepAlive) => while let Some(Ok(_)) = stream.next().await {},
        Ok(Service::Connect) => {
            connects.fetch_add(1, Ordering::SeqCst);
            while let Some(Ok(Frame::ConnectRequest(request))) = stream.next().await {
                let mut device = DeviceObject::from_slice(&request.device).unwrap();
                let on = device.spec["on"].as_bool().unwrap_or(false);
                device.set_status(&json!({ "on": on })).unwrap();
                let reply = ConnectResponse::device(device.to_vec().unwrap());
                if stream.send(Frame::ConnectResponse(reply)).await.is_err() {
                    return;
                }
            }
        }
        _ => {}
    }
}

struct Hub {
    server: Arc<RegistrationServer>,
    shutdown: CancellationToken,
    events: mpsc::UnboundedReceiver<HubEvent>,
    path: PathBuf,
}

async fn start_hub(dir: &Path) -> Hub {
    let (observer, events) = ChannelObserver::new();
    let observer = Arc::new(observer);
    let config = HubConfig::default()
        .with_socket_dir(dir)
        .with_dial_timeout(Duration::from_secs(1));
    let path = config.registration_path();
    let manager = PoolManager::new(config)
        .with_registration_observer(observer.clone())
        .with_device_observer(observer);

    let server = Arc::new(RegistrationServer::new(Arc::new(manager)));
    let shutdown = CancellationToken::new();
    tokio::spawn(server.clone().serve(shutdown.clone()));

    timeout(TIMEOUT, async {
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    Hub {
        server,
        shutdown,
        events,
        path,
    }
}

async fn register(hub: &Path, name: &str, version: &str, endpoint: &str) -> Frame {
    let mut stream = open_stream(hub, Service::Registration, TIMEOUT)
        .await
        .unwrap();
    stream
        .send(Frame::Register(AdaptorIdentity::unchecked(
            name, version, endpoint,
        )))
        .await
        .unwrap();
    timeout(TIMEOUT, recv_frame(&mut stream))
        .await
        .unwrap()
        .unwrap()
}

async fn next_registration(events: &mut mpsc::UnboundedReceiver<HubEvent>) -> RegistrationEvent {
    loop {
        match timeout(TIMEOUT, events.recv()).await.unwrap().unwrap() {
            HubEvent::Registration { event, .. } => return event,
            HubEvent::Device { .. } => continue,
        }
    }
}

fn fan_link() -> DeviceLinkRef {
    DeviceLinkRef::new(LinkKey::new("default", "fan").unwrap(), "dummy")
        .with_parameters(b"{}".to_vec())
}

fn fan_object(on: bool) -> DeviceObject {
    DeviceObject::new("devices.tentacle.io/v1alpha1", "DummyDevice", fan_link().key())
        .with_spec(&json!({ "on": on }))
        .unwrap()
}

#[rstest]
#[case::version_first("-bad-", "v9", "nope", "version")]
#[case::name_before_endpoint("-bad-", "v1alpha1", "nope", "name")]
#[case::suffix("dummy", "v1alpha1", "dummy.sock", "endpoint")]
#[case::absolute_path("dummy", "v1alpha1", "/tmp/dummy.socket", "endpoint")]
#[case::parent_dir("dummy", "v1alpha1", "../dummy.socket", "endpoint")]
#[tokio::test]
async fn test_rejects_invalid_requests_in_order(
    #[case] name: &str,
    #[case] version: &str,
    #[case] endpoint: &str,
    #[case] field: &str,
) {
    let dir = tempfile::tempdir().unwrap();
    let hub = start_hub(dir.path()).await;

    match register(&hub.path, name, version, endpoint).await {
        Frame::Status(status) => {
            assert_eq!(status.code, StatusCode::InvalidArgument);
            assert!(
                status.message.contains(field),
                "{field} error expected, got {}",
                status.message
            );
        }
        other => panic!("unexpected reply {other:?}"),
    }
    assert!(!hub.server.manager().pools().exist("dummy").await);

    hub.shutdown.cancel();
}

#[tokio::test]
async fn test_unreachable_adaptor_is_internal_error() {
    let dir = tempfile::tempdir().unwrap();
    let hub = start_hub(dir.path()).await;

    match register(&hub.path, "dummy", "v1alpha1", "dummy.socket").await {
        Frame::Status(status) => assert_eq!(status.code, StatusCode::Internal),
        other => panic!("unexpected reply {other:?}"),
    }
    assert!(!hub.server.manager().pools().exist("dummy").await);

    hub.shutdown.cancel();
}

#[tokio::test]
async fn test_link_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut hub = start_hub(dir.path()).await;
    let adaptor = FakeAdaptor::start(dir.path(), "dummy.socket");

    assert_eq!(
        register(&hub.path, "dummy", "v1alpha1", "dummy.socket").await,
        Frame::Void
    );
    assert_eq!(
        next_registration(&mut hub.events).await,
        RegistrationEvent::Started
    );

    let manager = hub.server.manager().clone();
    let link = fan_link();

    // creating twice keeps one live connection
    manager.create_connection(&link).await.unwrap();
    manager.create_connection(&link).await.unwrap();
    let pool = manager.pools().get("dummy").await.unwrap();
    assert_eq!(pool.connections().await.len(), 1);

    manager.send_data(&link, &fan_object(true)).await.unwrap();
    let observed = loop {
        match timeout(TIMEOUT, hub.events.recv()).await.unwrap().unwrap() {
            HubEvent::Device { link: key, observed, .. } => {
                assert_eq!(&key, link.key());
                break observed.unwrap();
            }
            HubEvent::Registration { .. } => continue,
        }
    };
    assert_eq!(observed.status["on"], json!(true));
    assert_eq!(adaptor.connects.load(Ordering::SeqCst), 1);

    // deleting a link that was never created succeeds
    let other = DeviceLinkRef::new(LinkKey::new("default", "lamp").unwrap(), "dummy");
    manager.delete_connection(&other).await.unwrap();

    manager.delete_connection(&link).await.unwrap();
    assert!(!pool.contains(link.key()).await);
    let error = manager
        .send_data(&link, &fan_object(false))
        .await
        .unwrap_err();
    assert!(matches!(error, HubError::ConnectionNotFound(_)));
    assert_eq!(error.to_string(), "adaptor is not existed");

    hub.shutdown.cancel();
    adaptor.stop();
}

#[tokio::test]
async fn test_reregistration_stops_old_pool_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut hub = start_hub(dir.path()).await;
    let adaptor = FakeAdaptor::start(dir.path(), "dummy.socket");

    assert_eq!(
        register(&hub.path, "dummy", "v1alpha1", "dummy.socket").await,
        Frame::Void
    );
    let first = hub.server.manager().pools().get("dummy").await.unwrap();

    assert_eq!(
        register(&hub.path, "dummy", "v1alpha1", "dummy.socket").await,
        Frame::Void
    );
    let second = hub.server.manager().pools().get("dummy").await.unwrap();

    assert!(first.is_stopped());
    assert!(!second.is_stopped());
    assert_eq!(
        next_registration(&mut hub.events).await,
        RegistrationEvent::Started
    );
    assert_eq!(
        next_registration(&mut hub.events).await,
        RegistrationEvent::Stopped
    );
    assert_eq!(
        next_registration(&mut hub.events).await,
        RegistrationEvent::Started
    );

    hub.shutdown.cancel();
    adaptor.stop();
}

#[tokio::test]
async fn test_removed_adaptor_socket_stops_pool() {
    let dir = tempfile::tempdir().unwrap();
    let mut hub = start_hub(dir.path()).await;
    let adaptor = FakeAdaptor::start(dir.path(), "dummy.socket");

    assert_eq!(
        register(&hub.path, "dummy", "v1alpha1", "dummy.socket").await,
        Frame::Void
    );
    assert_eq!(
        next_registration(&mut hub.events).await,
        RegistrationEvent::Started
    );

    std::fs::remove_file(dir.path().join("dummy.socket")).unwrap();
    assert_eq!(
        next_registration(&mut hub.events).await,
        RegistrationEvent::Stopped
    );
    assert!(!hub.server.manager().pools().exist("dummy").await);

    hub.shutdown.cancel();
    adaptor.stop();
}

#[tokio::test]
async fn test_shutdown_removes_registration_socket() {
    let dir = tempfile::tempdir().unwrap();
    let hub = start_hub(dir.path()).await;

    hub.shutdown.cancel();
    timeout(TIMEOUT, async {
        while hub.path.exists() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
