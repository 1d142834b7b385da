//! Registration endpoint of the hub.
//!
//! # Handshake
//!
//! ```text
//! adaptor                                   hub
//!    │  Open(Registration)                   │
//!    │ ────────────────────────────────────> │
//!    │  Register{name, version, endpoint}    │
//!    │ ────────────────────────────────────> │  validate version, name, endpoint
//!    │                                       │  dial <dir>/<endpoint>, KeepAlive
//!    │  Void | Status{code, message}         │
//!    │ <──────────────────────────────────── │
//! ```
//!
//! Validation failures answer `InvalidArgument` and change nothing. A
//! failure to dial back answers `Internal`.

use futures::SinkExt;
use std::sync::Arc;
use std::time::Duration;
use tentacle_core::AdaptorIdentity;
use tentacle_core::validation::is_socket_file;
use tentacle_network::{
    FrameStream, SocketEvent, SocketListener, SocketWatcher, cleanup_stale_sockets,
    read_preface, recv_frame,
};
use tentacle_protocol::{Frame, Service, Status, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{HubError, Result};
use crate::manager::PoolManager;

const PREFACE_TIMEOUT: Duration = Duration::from_secs(10);

/// Serves the registration socket and keeps the pool registry in step with
/// the adaptor sockets on disk.
pub struct RegistrationServer {
    manager: Arc<PoolManager>,
}

impl RegistrationServer {
    pub fn new(manager: Arc<PoolManager>) -> Self {
        Self { manager }
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<PoolManager> {
        &self.manager
    }

    /// Validate a registration request and install the adaptor's pool.
    pub async fn register(&self, identity: &AdaptorIdentity) -> Result<()> {
        if let Err(e) = identity.validate() {
            let e = HubError::from(e);
            error!(adaptor = %identity.name(), error = %e, "Rejected the register request");
            return Err(e);
        }

        if let Err(e) = self.manager.add_adaptor(identity).await {
            error!(adaptor = %identity.name(), error = %e, "Failed to add adaptor");
            return Err(e);
        }
        Ok(())
    }

    /// Serve until `shutdown` is cancelled, then stop every pool.
    ///
    /// Stale sockets are removed before listening. The registration socket
    /// file is removed on return, which adaptors take as the signal to
    /// register again once it reappears.
    pub async fn serve(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        let config = self.manager.config().clone();
        if let Err(e) = cleanup_stale_sockets(&config.socket_dir) {
            warn!(dir = %config.socket_dir.display(), error = %e, "Failed to clean up stale sockets");
        }

        let mut watcher = SocketWatcher::new(&config.socket_dir)?;
        let listener = SocketListener::bind(config.registration_path())?;
        info!(socket = %listener.path().display(), "Registration service started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(stream) => {
                        let server = self.clone();
                        tokio::spawn(async move { server.handle(stream).await });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept registration connection"),
                },
                event = watcher.next() => match event {
                    Ok(SocketEvent::Removed(name)) if name != config.registration_socket && is_socket_file(&name) => {
                        let removed = self.manager.remove_endpoint(&name).await;
                        if removed > 0 {
                            info!(endpoint = %name, "Adaptor socket removed, pool stopped");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "Socket watcher stopped");
                        break;
                    }
                },
            }
        }

        drop(listener);
        self.manager.stop().await;
        info!("Registration service stopped");
        Ok(())
    }

    async fn handle(&self, mut stream: FrameStream) {
        let service = match read_preface(&mut stream, PREFACE_TIMEOUT).await {
            Ok(service) => service,
            Err(e) => {
                debug!(error = %e, "Dropping connection without a valid preface");
                return;
            }
        };

        let reply = match service {
            Service::Registration => match recv_frame(&mut stream).await {
                Ok(Frame::Register(identity)) => match self.register(&identity).await {
                    Ok(()) => Frame::Void,
                    Err(e) => Frame::Status(e.to_status()),
                },
                Ok(other) => Frame::Status(Status::new(
                    StatusCode::InvalidArgument,
                    format!("expected Register, got {}", other.name()),
                )),
                Err(e) => {
                    debug!(error = %e, "Registration stream ended early");
                    return;
                }
            },
            other => Frame::Status(Status::new(
                StatusCode::Unimplemented,
                format!("service {other} is not served on the registration socket"),
            )),
        };

        if let Err(e) = stream.send(reply).await {
            warn!(error = %e, "Failed to answer registration request");
            return;
        }
        let _ = stream.close().await;
    }
}
