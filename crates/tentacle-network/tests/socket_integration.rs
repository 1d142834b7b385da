//! Integration tests for Unix socket streams
//!
//! These tests run real sockets inside a temporary directory and cover the
//! stream lifecycle: preface, exchange, half-close and peer loss.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tentacle_network::{
    CloseKind, NetworkError, SocketListener, SocketWatcher, StreamEnd, classify, half_close,
    open_stream, read_preface, recv_frame,
};
use tentacle_protocol::{ConnectRequest, ConnectResponse, Frame, Service};
use tokio::time::timeout;

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_connect_stream_exchange() {
    let dir = tempfile::tempdir().unwrap();
    let listener = SocketListener::bind(dir.path().join("dummy.socket")).unwrap();
    let path = listener.path().to_path_buf();

    let server = tokio::spawn(async move {
        let mut stream = listener.accept().await.unwrap();
        assert_eq!(
            read_preface(&mut stream, TIMEOUT).await.unwrap(),
            Service::Connect
        );

        // echo each request device back as a response until the peer is done
        while let Some(frame) = stream.next().await {
            match frame.unwrap() {
                Frame::ConnectRequest(request) => stream
                    .send(Frame::ConnectResponse(ConnectResponse::device(
                        request.device,
                    )))
                    .await
                    .unwrap(),
                other => panic!("unexpected frame {other:?}"),
            }
        }
    });

    let stream = open_stream(&path, Service::Connect, TIMEOUT).await.unwrap();
    let (mut sink, mut source) = stream.split();

    for device in [&b"{\"a\":1}"[..], &b"{\"a\":2}"[..]] {
        sink.send(Frame::ConnectRequest(ConnectRequest {
            parameters: Default::default(),
            device: device.to_vec().into(),
        }))
        .await
        .unwrap();

        match recv_frame(&mut source).await.unwrap() {
            Frame::ConnectResponse(response) => assert_eq!(&response.device[..], device),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    half_close(&mut sink).await.unwrap();
    timeout(TIMEOUT, server).await.unwrap().unwrap();
    assert!(matches!(
        recv_frame(&mut source).await,
        Err(NetworkError::Closed)
    ));
}

#[tokio::test]
async fn test_peer_drop_is_passive_close() {
    let dir = tempfile::tempdir().unwrap();
    let listener = SocketListener::bind(dir.path().join("dummy.socket")).unwrap();
    let path = listener.path().to_path_buf();

    let server = tokio::spawn(async move {
        let mut stream = listener.accept().await.unwrap();
        read_preface(&mut stream, TIMEOUT).await.unwrap();
        drop(stream);
    });

    let mut stream = open_stream(&path, Service::KeepAlive, TIMEOUT)
        .await
        .unwrap();
    server.await.unwrap();

    let outcome = match timeout(TIMEOUT, stream.next()).await.unwrap() {
        None => None,
        Some(Err(e)) => Some(e),
        Some(Ok(frame)) => panic!("unexpected frame {frame:?}"),
    };
    assert!(matches!(
        classify(outcome),
        StreamEnd::Closed(CloseKind::Passive)
    ));
}

#[tokio::test]
async fn test_dial_after_listener_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let listener = SocketListener::bind(dir.path().join("dummy.socket")).unwrap();
    let path = listener.path().to_path_buf();
    drop(listener);

    let error = open_stream(&path, Service::Connect, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(error, NetworkError::Dial { .. }));
}

#[tokio::test]
async fn test_watcher_sees_listener_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut watcher = SocketWatcher::new(dir.path()).unwrap();

    let listener = SocketListener::bind(dir.path().join("hub.socket")).unwrap();
    timeout(TIMEOUT, watcher.wait_created("hub.socket"))
        .await
        .unwrap()
        .unwrap();

    drop(listener);
    timeout(TIMEOUT, watcher.wait_removed("hub.socket"))
        .await
        .unwrap()
        .unwrap();
}
