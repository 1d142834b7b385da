//! Hub process: serves adaptor registrations and logs everything the
//! connection pools observe.

use std::sync::Arc;
use tentacle_cli::{init_tracing, shutdown_signal, socket_dir};
use tentacle_hub::{ChannelObserver, HubConfig, HubEvent, PoolManager, RegistrationServer};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info,tentacle_hub=debug")?;

    let config = HubConfig::default().with_socket_dir(socket_dir());
    info!(socket = %config.registration_path().display(), "Starting hub");

    let (observer, mut events) = ChannelObserver::new();
    let observer = Arc::new(observer);
    let manager = PoolManager::new(config)
        .with_registration_observer(observer.clone())
        .with_device_observer(observer);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                HubEvent::Registration { adaptor, event } => {
                    info!(%adaptor, %event, "Adaptor registration changed");
                }
                HubEvent::Device {
                    adaptor,
                    link,
                    observed: Ok(observed),
                } => {
                    info!(%adaptor, %link, status = %observed.status, "Device observed");
                }
                HubEvent::Device {
                    adaptor,
                    link,
                    observed: Err(e),
                } => {
                    warn!(%adaptor, %link, error = %e, "Device stream failed");
                }
            }
        }
    });

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested");
        signal.cancel();
    });

    let server = Arc::new(RegistrationServer::new(Arc::new(manager)));
    server.serve(shutdown).await?;
    Ok(())
}
