//! Bounded dialing of Unix socket endpoints.
//!
//! Every dial in the system is bounded: registration dials the hub, the hub
//! dials adaptors for keepalive and connect streams. A peer that does not
//! accept within the bound is reported as [`NetworkError::DialTimeout`].

use futures::SinkExt;
use std::path::Path;
use std::time::Duration;
use tentacle_protocol::{Frame, Service};
use tokio::net::UnixStream;
use tracing::{debug, error, warn};

use crate::error::{NetworkError, Result};
use crate::stream::{FrameStream, framed};

/// Dial `path`, giving up after `timeout`.
pub async fn dial(path: &Path, timeout: Duration) -> Result<UnixStream> {
    debug!("Dialing {}", path.display());

    match tokio::time::timeout(timeout, UnixStream::connect(path)).await {
        Ok(Ok(stream)) => {
            debug!("Connected to {}", path.display());
            Ok(stream)
        }
        Ok(Err(e)) => {
            error!("Failed to dial {}: {}", path.display(), e);
            Err(NetworkError::Dial {
                path: path.to_path_buf(),
                source: e,
            })
        }
        Err(_) => {
            warn!(
                "Dial {} timeout after {}ms",
                path.display(),
                timeout.as_millis()
            );
            Err(NetworkError::DialTimeout {
                path: path.to_path_buf(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

/// Dial `path` and open an RPC stream of the given service.
pub async fn open_stream(path: &Path, service: Service, timeout: Duration) -> Result<FrameStream> {
    let mut stream = framed(dial(path, timeout).await?);
    stream.send(Frame::Open(service)).await?;
    debug!(service = %service, "Opened stream to {}", path.display());
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_dial_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.socket");

        let error = dial(&path, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(error, NetworkError::Dial { .. }));
    }

    #[tokio::test]
    async fn test_open_stream_sends_preface() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.socket");
        let listener = UnixListener::bind(&path).unwrap();

        let dialer = tokio::spawn({
            let path = path.clone();
            async move { open_stream(&path, Service::KeepAlive, Duration::from_secs(1)).await }
        });

        let (accepted, _) = listener.accept().await.unwrap();
        let mut accepted = framed(accepted);
        let service = crate::stream::read_preface(&mut accepted, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(service, Service::KeepAlive);
        assert!(dialer.await.unwrap().is_ok());
    }
}
