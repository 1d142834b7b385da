//! Dummy adaptor process: a simulated fan registered with the local hub.

use std::sync::Arc;
use tentacle_adaptor::dummy::{ADAPTOR_NAME, DummyAdaptor};
use tentacle_adaptor::{AdaptorConfig, AdaptorServer, keep_registered};
use tentacle_cli::{init_tracing, shutdown_signal, socket_dir};
use tentacle_core::AdaptorIdentity;
use tentacle_core::constants::API_VERSION;
use tentacle_network::SocketListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

const ENDPOINT: &str = "dummy.socket";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info,tentacle_adaptor=debug")?;

    let identity = AdaptorIdentity::new(ADAPTOR_NAME, API_VERSION, ENDPOINT)?;
    let config = AdaptorConfig::new(identity).with_socket_dir(socket_dir());

    let listener = SocketListener::bind(config.endpoint_path())?;
    let shutdown = CancellationToken::new();
    let server = Arc::new(AdaptorServer::new(DummyAdaptor));
    let serving = tokio::spawn(server.serve(listener, shutdown.clone()));

    let signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested");
        signal.cancel();
    });

    keep_registered(config, shutdown.clone()).await?;
    shutdown.cancel();
    serving.await?;
    Ok(())
}
