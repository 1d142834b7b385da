//! One Connect stream carrying a single device link.
//!
//! The write half stays with the [`Connection`] so desired state can be
//! pushed at any time. The read half is owned by a receive task that decodes
//! observed state and hands it to the [`DeviceObserver`].
//!
//! ```text
//!  send()  ──> Mutex<FrameSink> ──(ConnectRequest)──> adaptor
//!                                                        │
//!  observer <── receive task <──(ConnectResponse)────────┘
//! ```

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tentacle_core::LinkKey;
use tentacle_network::{
    CloseKind, FrameSink, FrameSource, StreamEnd, classify, half_close, is_end_of_stream,
    open_stream,
};
use tentacle_protocol::{ConnectRequest, DeviceObject, Frame, Service};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::error::{HubError, Result};
use crate::events::DeviceObserver;

/// Snapshot of a live connection for diagnostics.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub link: LinkKey,
    pub connected_at: DateTime<Utc>,
    pub closed: bool,
}

pub struct Connection {
    link: LinkKey,
    sink: Mutex<FrameSink>,
    closed: Arc<AtomicBool>,
    cancel: CancellationToken,
    connected_at: DateTime<Utc>,
}

impl Connection {
    /// Open a Connect stream for `link` and start its receive task.
    ///
    /// The receive task stops when the adaptor ends the stream, when the
    /// connection is closed, or when `parent` is cancelled.
    pub async fn open(
        adaptor: &str,
        link: LinkKey,
        endpoint: &Path,
        dial_timeout: Duration,
        observer: Option<Arc<dyn DeviceObserver>>,
        parent: &CancellationToken,
    ) -> Result<Self> {
        let stream = open_stream(endpoint, Service::Connect, dial_timeout).await?;
        let (sink, source) = stream.split();

        let closed = Arc::new(AtomicBool::new(false));
        let cancel = parent.child_token();

        tokio::spawn(receive(
            adaptor.to_string(),
            link.clone(),
            source,
            observer,
            cancel.clone(),
            closed.clone(),
        ));

        debug!(adaptor = %adaptor, link = %link, "Connection opened");
        Ok(Self {
            link,
            sink: Mutex::new(sink),
            closed,
            cancel,
            connected_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn link(&self) -> &LinkKey {
        &self.link
    }

    /// Returns `true` once the stream ended from either side.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }

    #[must_use]
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            link: self.link.clone(),
            connected_at: self.connected_at,
            closed: self.is_closed(),
        }
    }

    /// Push desired state down the stream.
    pub async fn send(&self, parameters: &[u8], device: &DeviceObject) -> Result<()> {
        if self.is_closed() {
            return Err(HubError::ConnectionClosed(self.link.clone()));
        }

        let request = ConnectRequest {
            parameters: Bytes::copy_from_slice(parameters),
            device: Bytes::from(device.to_vec()?),
        };
        trace!(link = %self.link, bytes = request.device.len(), "Sending desired state");

        let mut sink = self.sink.lock().await;
        match sink.send(Frame::ConnectRequest(request)).await {
            Ok(()) => Ok(()),
            Err(e) if is_end_of_stream(&e) => {
                self.closed.store(true, Ordering::Release);
                Err(HubError::ConnectionClosed(self.link.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Half-close the stream and stop the receive task.
    pub async fn close(&self) -> Result<()> {
        self.cancel.cancel();

        let mut sink = self.sink.lock().await;
        match half_close(&mut sink).await {
            Ok(()) => Ok(()),
            Err(tentacle_network::NetworkError::Protocol(e)) if is_end_of_stream(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn receive(
    adaptor: String,
    link: LinkKey,
    mut source: FrameSource,
    observer: Option<Arc<dyn DeviceObserver>>,
    cancel: CancellationToken,
    closed: Arc<AtomicBool>,
) {
    let notify = |observed: std::result::Result<DeviceObject, HubError>| {
        if let Some(observer) = &observer {
            observer.on_device_changes(&adaptor, &link, observed);
        }
    };

    let end = loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break StreamEnd::Closed(CloseKind::Active),
            next = source.next() => next,
        };

        match next {
            Some(Ok(Frame::ConnectResponse(response))) => {
                if let Some(message) = response.error {
                    warn!(adaptor = %adaptor, link = %link, error = %message, "Adaptor reported an error");
                    notify(Err(HubError::Adaptor(message)));
                    continue;
                }
                match DeviceObject::from_slice(&response.device) {
                    Ok(observed) => notify(Ok(observed)),
                    Err(e) => {
                        warn!(adaptor = %adaptor, link = %link, error = %e, "Failed to decode observed state");
                        notify(Err(e.into()));
                    }
                }
            }
            Some(Ok(other)) => {
                warn!(adaptor = %adaptor, link = %link, frame = other.name(), "Ignoring unexpected frame");
            }
            Some(Err(e)) => break classify(Some(e)),
            None => break classify(None),
        }
    };

    closed.store(true, Ordering::Release);
    match end {
        StreamEnd::Closed(kind) => {
            debug!(adaptor = %adaptor, link = %link, close = ?kind, "Connection closed");
        }
        StreamEnd::Failed(e) => {
            error!(adaptor = %adaptor, link = %link, error = %e, "Connection failed");
            notify(Err(HubError::Receive(e.to_string())));
        }
    }
}
