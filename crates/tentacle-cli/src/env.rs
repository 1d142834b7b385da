use std::path::PathBuf;
use tentacle_core::constants::DEFAULT_SOCKET_DIR;

/// Overrides the directory holding the hub and adaptor sockets.
pub const SOCKET_DIR_ENV: &str = "TENTACLE_SOCKET_DIR";

/// Socket directory from the environment, or the default one.
#[must_use]
pub fn socket_dir() -> PathBuf {
    socket_dir_from(std::env::var(SOCKET_DIR_ENV).ok())
}

fn socket_dir_from(value: Option<String>) -> PathBuf {
    match value {
        Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
        _ => PathBuf::from(DEFAULT_SOCKET_DIR),
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, DEFAULT_SOCKET_DIR)]
    #[case(Some(""), DEFAULT_SOCKET_DIR)]
    #[case(Some("  "), DEFAULT_SOCKET_DIR)]
    #[case(Some("/run/tentacle"), "/run/tentacle")]
    fn test_socket_dir(#[case] value: Option<&str>, #[case] expected: &str) {
        assert_eq!(
            socket_dir_from(value.map(str::to_string)),
            PathBuf::from(expected)
        );
    }
}
