//! Per-adaptor connection pool.
//!
//! A pool owns everything the hub holds towards one adaptor:
//!
//! - one KeepAlive stream, beaten every heartbeat interval
//! - one Connect stream per device link, opened on demand
//!
//! # Heartbeat outcomes
//!
//! | Send result | Event | Pool |
//! |---|---|---|
//! | ok | `Healthy` | keeps ticking |
//! | end of stream | none | torn down |
//! | any other error | `Unhealthy(msg)` | keeps ticking |
//!
//! `Started` is emitted when the heartbeat task starts and `Stopped` when it
//! exits, whatever the reason.

use futures::{Sink, SinkExt, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tentacle_core::{DeviceLinkRef, LinkKey};
use tentacle_network::{FrameSink, FrameSource, is_end_of_stream, open_stream};
use tentacle_protocol::{DeviceObject, Frame, ProtocolError, Service};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionInfo};
use crate::error::{HubError, Result};
use crate::events::{DeviceObserver, EventNotifier, RegistrationEvent};

pub struct ConnectionPool {
    adaptor: String,
    endpoint: PathBuf,
    dial_timeout: Duration,
    observer: Option<Arc<dyn DeviceObserver>>,
    connections: RwLock<HashMap<LinkKey, Arc<Connection>>>,
    keepalive: Mutex<Option<(FrameSink, FrameSource)>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl ConnectionPool {
    /// Dial the adaptor and open its KeepAlive stream with a first heartbeat.
    ///
    /// Nothing is spawned until [`ConnectionPool::start`].
    pub async fn connect(
        adaptor: impl Into<String>,
        endpoint: impl Into<PathBuf>,
        dial_timeout: Duration,
        observer: Option<Arc<dyn DeviceObserver>>,
    ) -> Result<Self> {
        let adaptor = adaptor.into();
        let endpoint = endpoint.into();

        let mut keepalive = open_stream(&endpoint, Service::KeepAlive, dial_timeout).await?;
        keepalive.send(Frame::Void).await?;
        let (sink, source) = keepalive.split();

        debug!(adaptor = %adaptor, endpoint = %endpoint.display(), "Connection pool ready");
        Ok(Self {
            adaptor,
            endpoint,
            dial_timeout,
            observer,
            connections: RwLock::new(HashMap::new()),
            keepalive: Mutex::new(Some((sink, source))),
            heartbeat: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn adaptor(&self) -> &str {
        &self.adaptor
    }

    #[must_use]
    pub fn endpoint(&self) -> &Path {
        &self.endpoint
    }

    /// Returns `true` once the pool was stopped or torn down.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Spawn the heartbeat task. Calling it again has no effect.
    pub async fn start(&self, notifier: EventNotifier, interval: Duration) {
        let Some((sink, mut source)) = self.keepalive.lock().await.take() else {
            return;
        };

        // adaptors never write on KeepAlive, so the read half only ends
        // when the adaptor closed the stream
        let cancel = self.cancel.clone();
        let adaptor = self.adaptor.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = async { while let Some(Ok(_)) = source.next().await {} } => {
                    debug!(adaptor = %adaptor, "KeepAlive stream ended by adaptor");
                    cancel.cancel();
                }
            }
        });

        let handle = tokio::spawn(run_heartbeat(
            sink,
            interval,
            notifier,
            self.cancel.clone(),
        ));
        *self.heartbeat.lock().await = Some(handle);
        info!(adaptor = %self.adaptor, "Connection pool started");
    }

    /// Open the Connect stream of a link.
    ///
    /// Idempotent per link key; a connection that already ended is replaced.
    pub async fn create(&self, link: &DeviceLinkRef) -> Result<()> {
        if self.is_stopped() {
            return Err(HubError::PoolStopped(self.adaptor.clone()));
        }

        let mut connections = self.connections.write().await;
        if let Some(existing) = connections.get(link.key()) {
            if !existing.is_closed() {
                return Ok(());
            }
            debug!(adaptor = %self.adaptor, link = %link.key(), "Replacing closed connection");
        }

        let connection = Connection::open(
            &self.adaptor,
            link.key().clone(),
            &self.endpoint,
            self.dial_timeout,
            self.observer.clone(),
            &self.cancel,
        )
        .await?;
        connections.insert(link.key().clone(), Arc::new(connection));
        Ok(())
    }

    /// Half-close and forget the connection of a link. Absent links are ignored.
    pub async fn delete(&self, key: &LinkKey) -> Result<()> {
        let removed = self.connections.write().await.remove(key);
        if let Some(connection) = removed {
            connection.close().await?;
            debug!(adaptor = %self.adaptor, link = %key, "Connection deleted");
        }
        Ok(())
    }

    /// Push desired state to the connection of a link.
    pub async fn send_data(&self, link: &DeviceLinkRef, device: &DeviceObject) -> Result<()> {
        let connections = self.connections.read().await;
        match connections.get(link.key()) {
            Some(connection) => connection.send(link.parameters(), device).await,
            None => Err(HubError::ConnectionNotFound(link.key().clone())),
        }
    }

    pub async fn contains(&self, key: &LinkKey) -> bool {
        self.connections.read().await.contains_key(key)
    }

    pub async fn connections(&self) -> Vec<ConnectionInfo> {
        let connections = self.connections.read().await;
        let mut infos: Vec<_> = connections.values().map(|c| c.info()).collect();
        infos.sort_by(|a, b| a.link.cmp(&b.link));
        infos
    }

    /// Stop the heartbeat and close every connection.
    ///
    /// Returns once the heartbeat task emitted `Stopped`.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let connections: Vec<_> = self.connections.write().await.drain().collect();
        for (key, connection) in connections {
            if let Err(e) = connection.close().await {
                debug!(adaptor = %self.adaptor, link = %key, error = %e, "Error while closing connection");
            }
        }

        if let Some(handle) = self.heartbeat.lock().await.take()
            && let Err(e) = handle.await
        {
            warn!(adaptor = %self.adaptor, error = %e, "Heartbeat task failed");
        }
        info!(adaptor = %self.adaptor, "Connection pool stopped");
    }
}

/// Beat `sink` every `interval` until cancelled or the stream ends.
///
/// The first beat happens one interval after the start. On exit the sink is
/// half-closed and the pool token is cancelled.
pub async fn run_heartbeat<S>(
    mut sink: S,
    interval: Duration,
    notifier: EventNotifier,
    cancel: CancellationToken,
) where
    S: Sink<Frame, Error = ProtocolError> + Unpin,
{
    notifier.notice(RegistrationEvent::Started);

    let mut ticker = interval_at(Instant::now() + interval, interval);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match sink.send(Frame::Void).await {
            Ok(()) => notifier.notice(RegistrationEvent::Healthy),
            Err(e) if is_end_of_stream(&e) => {
                debug!(error = %e, "KeepAlive stream ended");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Heartbeat failed");
                notifier.notice(RegistrationEvent::Unhealthy(e.to_string()));
            }
        }
    }

    cancel.cancel();
    let _ = sink.close().await;
    notifier.notice(RegistrationEvent::Stopped);
}
