//! Registration of an adaptor with the hub.
//!
//! An adaptor registers once at startup and again every time the hub's
//! registration socket is recreated, which is how a restarted hub learns
//! about adaptors that were already running.

use futures::SinkExt;
use std::time::Duration;
use tentacle_network::{NetworkError, SocketWatcher, open_stream, recv_frame};
use tentacle_protocol::{Frame, Service};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AdaptorConfig;
use crate::error::{AdaptorError, Result};

const REGISTER_ATTEMPTS: u32 = 5;
const REGISTER_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Send one register request and wait for the hub's answer.
pub async fn register(config: &AdaptorConfig) -> Result<()> {
    let mut stream = open_stream(&config.hub_path(), Service::Registration, config.dial_timeout).await?;
    stream
        .send(Frame::Register(config.identity.clone()))
        .await
        .map_err(NetworkError::from)?;

    let reply = recv_frame(&mut stream).await?;
    let _ = stream.close().await;
    match reply {
        Frame::Void => Ok(()),
        Frame::Status(status) => Err(AdaptorError::Registration(status)),
        other => Err(NetworkError::unexpected("Void", other.name()).into()),
    }
}

/// Register, retrying while the hub socket is not yet accepting.
///
/// The hub's socket file appears before its listener accepts, so a dial
/// right after the creation event can be refused. A status answer is final.
pub async fn register_with_retry(config: &AdaptorConfig) -> Result<()> {
    let mut attempt = 1;
    loop {
        match register(config).await {
            Ok(()) => return Ok(()),
            Err(e @ AdaptorError::Registration(_)) => return Err(e),
            Err(e) if attempt >= REGISTER_ATTEMPTS => return Err(e),
            Err(e) => {
                debug!(attempt, error = %e, "Registration attempt failed, retrying");
                attempt += 1;
                tokio::time::sleep(REGISTER_RETRY_DELAY).await;
            }
        }
    }
}

/// Register now and after every restart of the hub, until `shutdown`.
///
/// Returns the first error; a hub restart is only noticed while the socket
/// directory is watchable.
pub async fn keep_registered(config: AdaptorConfig, shutdown: CancellationToken) -> Result<()> {
    let mut watcher = SocketWatcher::new(&config.socket_dir)?;
    let name = config.identity.name().to_string();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            registered = register_with_retry(&config) => registered?,
        }
        info!(adaptor = %name, hub = %config.hub_path().display(), "Registered to hub");

        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            removed = watcher.wait_removed(&config.hub_socket) => removed?,
        }
        warn!(adaptor = %name, "Hub socket removed, waiting for the hub to come back");

        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            created = watcher.wait_created(&config.hub_socket) => created?,
        }
        info!(adaptor = %name, "Hub socket recreated, registering again");
    }
}
