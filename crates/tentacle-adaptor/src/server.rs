//! Adaptor endpoint serving the hub.
//!
//! Every accepted stream starts with an `Open` preface:
//!
//! | Service | Handling |
//! |---|---|
//! | `KeepAlive` | heartbeats are drained until the hub closes the stream |
//! | `Connect` | desired state drives one [`Device`]; observed state flows back |
//! | `Registration` | answered with `Status{Unimplemented}` |
//!
//! # Connect stream
//!
//! ```text
//! hub                                    adaptor
//!  │  ConnectRequest{parameters, device}    │  decode, create device once,
//!  │ ─────────────────────────────────────> │  configure
//!  │  ConnectResponse{device}               │
//!  │ <───────────────────────────────────── │  whenever the device reports
//!  │  ConnectResponse{error}                │
//!  │ <───────────────────────────────────── │  decode or configure failure,
//!  │                                        │  then the stream ends
//! ```

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tentacle_network::{
    FrameStream, SocketListener, StreamEnd, classify, is_end_of_stream, read_preface,
};
use tentacle_protocol::{
    ConnectRequest, ConnectResponse, DeviceObject, Frame, Service, Status, StatusCode,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::device::{Adaptor, Device, Parameters, Report, StatusReporter};
use crate::error::{AdaptorError, Result};

const PREFACE_TIMEOUT: Duration = Duration::from_secs(10);

type DeviceParameters<A> = <<A as Adaptor>::Device as Device>::Parameters;

/// Serves the hub on an adaptor's socket.
pub struct AdaptorServer<A: Adaptor> {
    adaptor: A,
}

impl<A: Adaptor> AdaptorServer<A> {
    pub fn new(adaptor: A) -> Self {
        Self { adaptor }
    }

    #[must_use]
    pub fn adaptor(&self) -> &A {
        &self.adaptor
    }

    /// Accept streams until `shutdown` is cancelled.
    ///
    /// The listener is bound by the caller so it exists before the adaptor
    /// registers. Its socket file is removed on return.
    pub async fn serve(self: Arc<Self>, listener: SocketListener, shutdown: CancellationToken) {
        info!(socket = %listener.path().display(), "Adaptor service started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(stream) => {
                        let server = self.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move { server.handle(stream, shutdown).await });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept hub connection"),
                },
            }
        }
        info!("Adaptor service stopped");
    }

    async fn handle(&self, mut stream: FrameStream, shutdown: CancellationToken) {
        let service = match read_preface(&mut stream, PREFACE_TIMEOUT).await {
            Ok(service) => service,
            Err(e) => {
                debug!(error = %e, "Dropping connection without a valid preface");
                return;
            }
        };

        match service {
            Service::KeepAlive => keep_alive(stream, shutdown).await,
            Service::Connect => self.connect(stream, shutdown).await,
            Service::Registration => {
                let status = Status::new(
                    StatusCode::Unimplemented,
                    "registration is served by the hub, not by adaptors",
                );
                if let Err(e) = stream.send(Frame::Status(status)).await {
                    debug!(error = %e, "Failed to answer registration preface");
                }
                let _ = stream.close().await;
            }
        }
    }

    /// Run the service loop of one Connect stream.
    pub async fn connect(&self, stream: FrameStream, shutdown: CancellationToken) {
        let (mut sink, mut source) = stream.split();
        let (reporter, mut reports) = StatusReporter::channel();
        let mut device: Option<A::Device> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                next = source.next() => match next {
                    Some(Ok(Frame::ConnectRequest(request))) => {
                        if let Err(e) = self.apply(&mut device, &reporter, request).await {
                            warn!(error = %e, "Failed to apply desired state");
                            let reply = Frame::ConnectResponse(ConnectResponse::error(e.to_string()));
                            if let Err(e) = sink.send(reply).await {
                                debug!(error = %e, "Failed to report error to hub");
                            }
                            break;
                        }
                    }
                    Some(Ok(other)) => {
                        warn!(frame = other.name(), "Unexpected frame on Connect stream");
                        break;
                    }
                    Some(Err(e)) => {
                        if let StreamEnd::Failed(e) = classify(Some(e)) {
                            error!(error = %e, "Failed to receive connect request from hub");
                        }
                        break;
                    }
                    None => {
                        debug!("Connect stream closed by hub");
                        break;
                    }
                },
                Some(report) = reports.recv() => {
                    let response = match report {
                        Report::Device(observed) => match observed.to_vec() {
                            Ok(bytes) => ConnectResponse::device(bytes),
                            Err(e) => ConnectResponse::error(format!("failed to encode device: {e}")),
                        },
                        Report::Error(message) => ConnectResponse::error(message),
                    };
                    if let Err(e) = sink.send(Frame::ConnectResponse(response)).await {
                        if !is_end_of_stream(&e) {
                            error!(error = %e, "Failed to send response to hub");
                        }
                        break;
                    }
                }
            }
        }

        drop(reports);
        if let Some(mut device) = device {
            device.shutdown().await;
        }
        let _ = sink.close().await;
    }

    async fn apply(
        &self,
        device: &mut Option<A::Device>,
        reporter: &StatusReporter,
        request: ConnectRequest,
    ) -> Result<()> {
        let parameters: DeviceParameters<A> = if request.parameters.is_empty() {
            Default::default()
        } else {
            serde_json::from_slice(&request.parameters).map_err(|e| {
                AdaptorError::invalid_parameters(format!("failed to unmarshal parameters: {e}"))
            })?
        };
        parameters.validate()?;

        let object = DeviceObject::from_slice(&request.device)
            .map_err(|e| AdaptorError::invalid_device(format!("failed to unmarshal device: {e}")))?;

        if device.is_none() {
            let Some(key) = object.link_key() else {
                warn!(
                    namespace = %object.metadata.namespace,
                    name = %object.metadata.name,
                    "Ignoring desired state without a device name"
                );
                return Ok(());
            };
            info!(link = %key, kind = %object.kind, "Device created");
            *device = Some(self.adaptor.create_device(key, reporter.clone()));
        }

        match device {
            Some(device) => device.configure(parameters, object).await,
            None => Ok(()),
        }
    }
}

/// Drain heartbeats until the hub ends the stream.
async fn keep_alive(mut stream: FrameStream, shutdown: CancellationToken) {
    let end = loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break None,
            next = stream.next() => next,
        };
        match next {
            Some(Ok(_)) => {}
            Some(Err(e)) => break Some(classify(Some(e))),
            None => break Some(classify(None)),
        }
    };

    if let Some(StreamEnd::Failed(e)) = end {
        error!(error = %e, "Failed to receive keepalive from hub");
    }
    let _ = stream.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::NoParameters;
    use serde_json::json;
    use std::sync::Mutex;
    use tentacle_core::LinkKey;
    use tentacle_network::framed;
    use tentacle_protocol::DeviceObject;
    use tokio::net::UnixStream;

    #[derive(Default)]
    struct Recorder {
        created: Mutex<Vec<LinkKey>>,
        shutdowns: Arc<Mutex<usize>>,
    }

    struct EchoDevice {
        reporter: StatusReporter,
        shutdowns: Arc<Mutex<usize>>,
    }

    impl Device for EchoDevice {
        type Parameters = NoParameters;

        async fn configure(&mut self, _: NoParameters, mut device: DeviceObject) -> Result<()> {
            if device.spec["fail"] == json!(true) {
                return Err(AdaptorError::device("refused"));
            }
            device.status = device.spec.clone();
            self.reporter.report(device);
            Ok(())
        }

        async fn shutdown(&mut self) {
            *self.shutdowns.lock().unwrap() += 1;
        }
    }

    impl Adaptor for Recorder {
        type Device = EchoDevice;

        fn create_device(&self, key: LinkKey, reporter: StatusReporter) -> EchoDevice {
            self.created.lock().unwrap().push(key);
            EchoDevice {
                reporter,
                shutdowns: self.shutdowns.clone(),
            }
        }
    }

    fn request(namespace: &str, name: &str, spec: serde_json::Value) -> Frame {
        let mut object = DeviceObject::default();
        object.metadata.namespace = namespace.to_string();
        object.metadata.name = name.to_string();
        object.spec = spec;
        Frame::ConnectRequest(ConnectRequest {
            parameters: Default::default(),
            device: object.to_vec().unwrap().into(),
        })
    }

    fn start() -> (Arc<AdaptorServer<Recorder>>, FrameStream, tokio::task::JoinHandle<()>) {
        let (hub, adaptor) = UnixStream::pair().unwrap();
        let server = Arc::new(AdaptorServer::new(Recorder::default()));
        let task = {
            let server = server.clone();
            tokio::spawn(async move {
                server
                    .connect(framed(adaptor), CancellationToken::new())
                    .await
            })
        };
        (server, framed(hub), task)
    }

    async fn response(hub: &mut FrameStream) -> ConnectResponse {
        match hub.next().await {
            Some(Ok(Frame::ConnectResponse(response))) => response,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_device_created_once_and_shut_down_on_eof() {
        let (server, mut hub, task) = start();

        hub.send(request("default", "fan", json!({"on": true})))
            .await
            .unwrap();
        let observed = DeviceObject::from_slice(&response(&mut hub).await.device).unwrap();
        assert_eq!(observed.status, json!({"on": true}));

        hub.send(request("default", "fan", json!({"on": false})))
            .await
            .unwrap();
        let observed = DeviceObject::from_slice(&response(&mut hub).await.device).unwrap();
        assert_eq!(observed.status, json!({"on": false}));

        hub.close().await.unwrap();
        task.await.unwrap();
        assert_eq!(server.adaptor().created.lock().unwrap().len(), 1);
        assert_eq!(*server.adaptor().shutdowns.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unnamed_object_creates_no_device() {
        let (server, mut hub, task) = start();

        hub.send(request("", "fan", json!({}))).await.unwrap();
        hub.send(request("default", "fan", json!({}))).await.unwrap();
        response(&mut hub).await;

        hub.close().await.unwrap();
        task.await.unwrap();
        let created = server.adaptor().created.lock().unwrap();
        assert_eq!(created.as_slice(), &[LinkKey::new("default", "fan").unwrap()]);
    }

    #[tokio::test]
    async fn test_configure_failure_reports_and_ends_stream() {
        let (server, mut hub, task) = start();

        hub.send(request("default", "fan", json!({"fail": true})))
            .await
            .unwrap();
        let reply = response(&mut hub).await;
        assert_eq!(
            reply.error.as_deref(),
            Some("failed to configure device: refused")
        );
        assert!(hub.next().await.is_none());

        task.await.unwrap();
        assert_eq!(*server.adaptor().shutdowns.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_device_ends_stream() {
        let (server, mut hub, task) = start();

        hub.send(Frame::ConnectRequest(ConnectRequest {
            parameters: Default::default(),
            device: "not json".into(),
        }))
        .await
        .unwrap();
        let reply = response(&mut hub).await;
        assert!(reply.error.unwrap().starts_with("invalid device: failed to unmarshal device"));

        task.await.unwrap();
        assert!(server.adaptor().created.lock().unwrap().is_empty());
    }
}
