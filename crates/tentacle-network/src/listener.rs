//! Listening Unix sockets inside the shared socket directory.

use std::fs;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use tentacle_core::validation::is_socket_file;
use tokio::net::UnixListener;
use tracing::{debug, info, warn};

use crate::error::{NetworkError, Result};
use crate::stream::{FrameStream, framed};

/// A bound socket that removes its file when dropped.
///
/// Removing the file is how peers watching the directory learn that this
/// side went away.
#[derive(Debug)]
pub struct SocketListener {
    path: PathBuf,
    listener: UnixListener,
}

impl SocketListener {
    /// Bind `path`, replacing a leftover socket file of a previous run.
    pub fn bind(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let listen_error = |source| NetworkError::Listen {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(listen_error)?;
        }
        if path.exists() {
            fs::remove_file(&path).map_err(listen_error)?;
        }

        let listener = UnixListener::bind(&path).map_err(listen_error)?;
        info!("Listening on {}", path.display());
        Ok(Self { path, listener })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept the next connection as a framed stream.
    pub async fn accept(&self) -> Result<FrameStream> {
        let (stream, _) = self.listener.accept().await?;
        debug!("Accepted connection on {}", self.path.display());
        Ok(framed(stream))
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to remove socket {}: {}", self.path.display(), e);
        }
    }
}

/// Remove leftover `*.socket` files from `dir`, creating it if missing.
///
/// Hidden files, directories, files without the socket suffix and sockets
/// that still accept connections are left alone. Returns how many files
/// were removed.
pub fn cleanup_stale_sockets(dir: &Path) -> Result<usize> {
    fs::create_dir_all(dir)?;

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with('.') || !is_socket_file(name) {
            continue;
        }
        if entry.file_type()?.is_dir() {
            continue;
        }
        if StdUnixStream::connect(entry.path()).is_ok() {
            debug!("Keeping live socket {}", name);
            continue;
        }

        fs::remove_file(entry.path())?;
        debug!("Removed stale socket {}", name);
        removed += 1;
    }

    if removed > 0 {
        info!("Removed {} stale socket(s) from {}", removed, dir.display());
    }
    Ok(removed)
}
