//! Hub-wide registry of adaptor connection pools.

use std::collections::HashMap;
use std::sync::Arc;
use tentacle_core::{AdaptorIdentity, DeviceLinkRef};
use tentacle_protocol::DeviceObject;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::HubConfig;
use crate::error::{HubError, Result};
use crate::events::{DeviceObserver, EventNotifier, RegistrationObserver};
use crate::pool::ConnectionPool;

/// Map of adaptor name to its connection pool.
#[derive(Default)]
pub struct AdaptorPools {
    pools: RwLock<HashMap<String, Arc<ConnectionPool>>>,
}

impl AdaptorPools {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<ConnectionPool>> {
        self.pools.read().await.get(name).cloned()
    }

    /// Install `pool`, returning the pool it replaced.
    pub async fn add(&self, name: &str, pool: Arc<ConnectionPool>) -> Option<Arc<ConnectionPool>> {
        self.pools.write().await.insert(name.to_string(), pool)
    }

    pub async fn delete(&self, name: &str) -> Option<Arc<ConnectionPool>> {
        self.pools.write().await.remove(name)
    }

    pub async fn exist(&self, name: &str) -> bool {
        self.pools.read().await.contains_key(name)
    }

    /// Visit every pool until `visit` returns `false`.
    pub async fn range<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &Arc<ConnectionPool>) -> bool,
    {
        for (name, pool) in self.pools.read().await.iter() {
            if !visit(name, pool) {
                break;
            }
        }
    }

    async fn drain(&self) -> Vec<Arc<ConnectionPool>> {
        self.pools.write().await.drain().map(|(_, pool)| pool).collect()
    }
}

/// Owns every adaptor pool and routes device link operations to them.
pub struct PoolManager {
    config: HubConfig,
    pools: AdaptorPools,
    registration_observer: Option<Arc<dyn RegistrationObserver>>,
    device_observer: Option<Arc<dyn DeviceObserver>>,
    // serializes add/remove so a replaced pool is always stopped before its
    // successor is installed
    registering: tokio::sync::Mutex<()>,
}

impl PoolManager {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            pools: AdaptorPools::new(),
            registration_observer: None,
            device_observer: None,
            registering: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_registration_observer(mut self, observer: Arc<dyn RegistrationObserver>) -> Self {
        self.registration_observer = Some(observer);
        self
    }

    pub fn with_device_observer(mut self, observer: Arc<dyn DeviceObserver>) -> Self {
        self.device_observer = Some(observer);
        self
    }

    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    #[must_use]
    pub fn pools(&self) -> &AdaptorPools {
        &self.pools
    }

    /// Build a pool for a validated identity and install it.
    ///
    /// A dial failure leaves the registry untouched. An existing pool under
    /// the same name is stopped before the new one is installed.
    pub async fn add_adaptor(&self, identity: &AdaptorIdentity) -> Result<()> {
        let endpoint = self.config.endpoint_path(identity.endpoint());
        let pool = ConnectionPool::connect(
            identity.name(),
            endpoint,
            self.config.dial_timeout,
            self.device_observer.clone(),
        )
        .await
        .map_err(|e| HubError::internal(format!("could not create adaptor connection pool: {e}")))?;
        let pool = Arc::new(pool);

        let _guard = self.registering.lock().await;
        if let Some(stale) = self.pools.delete(identity.name()).await {
            info!(adaptor = %identity.name(), "Replacing stale connection pool");
            stale.stop().await;
        }
        self.pools.add(identity.name(), pool.clone()).await;

        let notifier = EventNotifier::new(identity.name(), self.registration_observer.clone());
        pool.start(notifier, self.config.heartbeat_interval).await;

        info!(adaptor = %identity, "Adaptor registered");
        Ok(())
    }

    /// Stop and forget the pool of an adaptor.
    pub async fn remove_adaptor(&self, name: &str) -> bool {
        let _guard = self.registering.lock().await;
        match self.pools.delete(name).await {
            Some(pool) => {
                pool.stop().await;
                info!(adaptor = %name, "Adaptor unregistered");
                true
            }
            None => false,
        }
    }

    /// Stop and forget every pool dialing the given endpoint file.
    pub async fn remove_endpoint(&self, endpoint: &str) -> usize {
        let mut names = Vec::new();
        self.pools
            .range(|name, pool| {
                if pool.endpoint().file_name().and_then(|f| f.to_str()) == Some(endpoint) {
                    names.push(name.to_string());
                }
                true
            })
            .await;

        let mut removed = 0;
        for name in names {
            if self.remove_adaptor(&name).await {
                removed += 1;
            }
        }
        removed
    }

    pub async fn create_connection(&self, link: &DeviceLinkRef) -> Result<()> {
        self.pool_of(link).await?.create(link).await
    }

    /// Close the connection of a link.
    ///
    /// Succeeds when the adaptor or the link is unknown.
    pub async fn delete_connection(&self, link: &DeviceLinkRef) -> Result<()> {
        match self.pools.get(link.adaptor()).await {
            Some(pool) => pool.delete(link.key()).await,
            None => Ok(()),
        }
    }

    pub async fn send_data(&self, link: &DeviceLinkRef, device: &DeviceObject) -> Result<()> {
        self.pool_of(link).await?.send_data(link, device).await
    }

    /// Stop every pool.
    pub async fn stop(&self) {
        let _guard = self.registering.lock().await;
        for pool in self.pools.drain().await {
            pool.stop().await;
        }
    }

    async fn pool_of(&self, link: &DeviceLinkRef) -> Result<Arc<ConnectionPool>> {
        match self.pools.get(link.adaptor()).await {
            Some(pool) => Ok(pool),
            None => {
                warn!(adaptor = %link.adaptor(), link = %link.key(), "No connection pool for adaptor");
                Err(HubError::AdaptorNotFound(link.adaptor().to_string()))
            }
        }
    }
}
