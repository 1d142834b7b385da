//! Device actor: one task owning one peripheral link.
//!
//! Every operation travels as a request through a bounded queue and is
//! answered on its own reply channel, so the link is only ever touched by the
//! actor task and operations are applied in arrival order.
//!
//! # Connection handling
//!
//! - The first operation dials lazily. A failed dial is returned to that
//!   caller and the actor goes back to `Idle`; there is no backoff on this
//!   path.
//! - A watcher follows the client's disconnect token and posts a
//!   connection-lost request into the same queue. The actor drops the
//!   client, invokes the connection-lost handler and, with auto reconnect,
//!   spawns a task that posts reconnect requests with exponential backoff.
//!   A successful dial resets the backoff to its one second baseline.
//! - Every successful dial replays the recorded subscriptions once.
//! - [`DeviceActor::close`] stops the task, cancels a pending dial and the
//!   live link. Calling it again is a no-op.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::error::{HardwareError, Result};
use crate::state::{ActorEvent, ActorState};
use crate::traits::{Connector, NotificationHandler, PeripheralClient};
use crate::types::{Capabilities, ResourceKey};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_RECONNECT_INTERVAL: Duration = Duration::from_secs(600);

/// Callback invoked when an established link is lost.
///
/// Runs on the actor task; it must not block.
pub type ConnectionLostHandler = Arc<dyn Fn(&HardwareError) + Send + Sync>;

#[derive(Clone)]
pub struct ConnectionOptions {
    pub auto_reconnect: bool,
    pub max_reconnect_interval: Duration,
    pub connect_timeout: Duration,
    /// Subscribe with notifications when a characteristic supports both
    /// notify and indicate.
    pub only_subscribe_notification: bool,
    /// Write without response when a characteristic supports both write modes.
    pub only_write_without_response: bool,
    pub on_connection_lost: Option<ConnectionLostHandler>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: false,
            max_reconnect_interval: DEFAULT_MAX_RECONNECT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            only_subscribe_notification: false,
            only_write_without_response: false,
            on_connection_lost: None,
        }
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("auto_reconnect", &self.auto_reconnect)
            .field("max_reconnect_interval", &self.max_reconnect_interval)
            .field("connect_timeout", &self.connect_timeout)
            .field("only_subscribe_notification", &self.only_subscribe_notification)
            .field("only_write_without_response", &self.only_write_without_response)
            .finish_non_exhaustive()
    }
}

impl ConnectionOptions {
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_max_reconnect_interval(mut self, interval: Duration) -> Self {
        self.max_reconnect_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_only_subscribe_notification(mut self, enabled: bool) -> Self {
        self.only_subscribe_notification = enabled;
        self
    }

    pub fn with_only_write_without_response(mut self, enabled: bool) -> Self {
        self.only_write_without_response = enabled;
        self
    }

    pub fn with_connection_lost_handler(mut self, handler: ConnectionLostHandler) -> Self {
        self.on_connection_lost = Some(handler);
        self
    }

    /// Write mode for a writable characteristic.
    fn write_without_response(&self, capabilities: Capabilities) -> bool {
        let with = capabilities.contains(Capabilities::WRITE);
        let without = capabilities.contains(Capabilities::WRITE_WITHOUT_RESPONSE);
        if with && without {
            self.only_write_without_response
        } else {
            without
        }
    }

    /// Subscription mode for a subscribable characteristic.
    fn indicate(&self, capabilities: Capabilities) -> bool {
        let notify = capabilities.contains(Capabilities::NOTIFY);
        let indicate = capabilities.contains(Capabilities::INDICATE);
        if notify && indicate {
            !self.only_subscribe_notification
        } else {
            indicate
        }
    }
}

enum Operation {
    Read(ResourceKey),
    Write(ResourceKey, Vec<u8>),
    Subscribe(ResourceKey, NotificationHandler),
    ClearSubscriptions,
    Reconnect,
    ConnectionLost { generation: u64 },
}

enum Reply {
    Data(Vec<u8>),
    Done,
}

struct Request {
    op: Operation,
    reply: oneshot::Sender<Result<Reply>>,
}

/// Handle to a running device actor.
///
/// Dropping the handle stops the actor as [`DeviceActor::close`] would,
/// without waiting for it.
pub struct DeviceActor {
    name: String,
    requests: mpsc::Sender<Request>,
    state: watch::Receiver<ActorState>,
    done: CancellationToken,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl DeviceActor {
    /// Spawn the actor task. No dial happens until the first operation.
    pub fn spawn<C: Connector>(
        name: impl Into<String>,
        connector: C,
        options: ConnectionOptions,
    ) -> Self {
        let name = name.into();
        let (requests, queue) = mpsc::channel(1);
        let (state_tx, state) = watch::channel(ActorState::Idle);
        let done = CancellationToken::new();
        let max_reconnect_interval = options.max_reconnect_interval;

        let actor = ActorLoop {
            name: name.clone(),
            connector,
            options,
            state: state_tx,
            client: None,
            generation: 0,
            subscriptions: BTreeMap::new(),
            backoff: Arc::new(StdMutex::new(Backoff::new(max_reconnect_interval))),
            requests: requests.clone(),
            reconnect_task: None,
            done: done.clone(),
        };
        let task = tokio::spawn(actor.run(queue));
        debug!(peripheral = %name, "Device actor spawned");

        Self {
            name,
            requests,
            state,
            done,
            closed: AtomicBool::new(false),
            task: Mutex::new(Some(task)),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> ActorState {
        *self.state.borrow()
    }

    /// Wait until the actor reaches `target` or is closed.
    pub async fn wait_for_state(&self, target: ActorState) -> ActorState {
        let mut state = self.state.clone();
        match state
            .wait_for(|s| *s == target || *s == ActorState::Closed)
            .await
        {
            Ok(s) => *s,
            Err(_) => ActorState::Closed,
        }
    }

    pub async fn read(&self, key: &ResourceKey) -> Result<Vec<u8>> {
        match self.request(Operation::Read(key.clone())).await? {
            Reply::Data(data) => Ok(data),
            Reply::Done => Ok(Vec::new()),
        }
    }

    pub async fn write(&self, key: &ResourceKey, data: impl Into<Vec<u8>>) -> Result<()> {
        self.request(Operation::Write(key.clone(), data.into()))
            .await
            .map(|_| ())
    }

    /// Subscribe to a characteristic.
    ///
    /// The subscription is recorded as soon as the capability check passes,
    /// even if the subscribe call itself fails, and is replayed after every
    /// reconnect.
    pub async fn subscribe(&self, key: &ResourceKey, handler: NotificationHandler) -> Result<()> {
        self.request(Operation::Subscribe(key.clone(), handler))
            .await
            .map(|_| ())
    }

    /// Forget every recorded subscription and clear them on the link.
    pub async fn clear_subscriptions(&self) -> Result<()> {
        self.request(Operation::ClearSubscriptions).await.map(|_| ())
    }

    /// Dial now if the link is down.
    pub async fn reconnect(&self) -> Result<()> {
        self.request(Operation::Reconnect).await.map(|_| ())
    }

    /// Stop the actor and cancel the link. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.done.cancel();

        let handle = self.task.lock().await.take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| HardwareError::Other(format!("device actor task failed: {e}")))?,
            None => Ok(()),
        }
    }

    async fn request(&self, op: Operation) -> Result<Reply> {
        let closed = || HardwareError::actor_closed(&self.name);
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed());
        }

        let (reply, response) = oneshot::channel();
        tokio::select! {
            biased;
            _ = self.done.cancelled() => return Err(closed()),
            sent = self.requests.send(Request { op, reply }) => sent.map_err(|_| closed())?,
        }
        response.await.map_err(|_| closed())?
    }
}

impl Drop for DeviceActor {
    fn drop(&mut self) {
        self.done.cancel();
    }
}

struct ActorLoop<C: Connector> {
    name: String,
    connector: C,
    options: ConnectionOptions,
    state: watch::Sender<ActorState>,
    client: Option<C::Client>,
    // bumped on every dial so a stale watcher cannot drop a newer link
    generation: u64,
    subscriptions: BTreeMap<ResourceKey, NotificationHandler>,
    // shared with the reconnect task, reset by every successful dial
    backoff: Arc<StdMutex<Backoff>>,
    requests: mpsc::Sender<Request>,
    reconnect_task: Option<JoinHandle<()>>,
    done: CancellationToken,
}

impl<C: Connector> ActorLoop<C> {
    async fn run(mut self, mut queue: mpsc::Receiver<Request>) -> Result<()> {
        let done = self.done.clone();
        loop {
            let request = tokio::select! {
                biased;
                _ = done.cancelled() => break,
                request = queue.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            if let Operation::ConnectionLost { generation } = request.op {
                self.on_connection_lost(generation);
                continue;
            }

            let result = tokio::select! {
                biased;
                _ = done.cancelled() => break,
                result = self.handle(request.op) => result,
            };
            // the caller may have given up waiting
            let _ = request.reply.send(result);
        }

        self.transition(ActorEvent::Close);
        if let Some(task) = self.reconnect_task.take() {
            task.abort();
        }
        if let Some(client) = self.client.take() {
            client.cancel_connection().await?;
        }
        info!(peripheral = %self.name, "Device actor closed");
        Ok(())
    }

    async fn handle(&mut self, op: Operation) -> Result<Reply> {
        self.ensure_connected().await?;
        if matches!(op, Operation::Reconnect) {
            return Ok(Reply::Done);
        }

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| HardwareError::connection_closed(&self.name))?;
        let profile = client
            .profile()
            .ok_or_else(|| HardwareError::ProfileNotFound {
                peripheral: self.name.clone(),
            })?;

        match op {
            Operation::Read(key) => {
                let characteristic = profile.find(&key)?;
                if !characteristic.capabilities.can_read() {
                    return Err(HardwareError::IncompatibleRead { resource: key });
                }
                client.read(characteristic).await.map(Reply::Data)
            }
            Operation::Write(key, data) => {
                let characteristic = profile.find(&key)?;
                if !characteristic.capabilities.can_write() {
                    return Err(HardwareError::IncompatibleWrite { resource: key });
                }
                let without_response = self
                    .options
                    .write_without_response(characteristic.capabilities);
                client
                    .write(characteristic, &data, without_response)
                    .await
                    .map(|()| Reply::Done)
            }
            Operation::Subscribe(key, handler) => {
                let characteristic = profile.find(&key)?;
                if !characteristic.capabilities.can_subscribe() {
                    return Err(HardwareError::IncompatibleSubscribe { resource: key });
                }
                let indicate = self.options.indicate(characteristic.capabilities);
                self.subscriptions.insert(key, handler.clone());
                client
                    .subscribe(characteristic, indicate, handler)
                    .await
                    .map(|()| Reply::Done)
            }
            Operation::ClearSubscriptions => {
                self.subscriptions.clear();
                client.clear_subscriptions().await.map(|()| Reply::Done)
            }
            Operation::Reconnect | Operation::ConnectionLost { .. } => Ok(Reply::Done),
        }
    }

    async fn ensure_connected(&mut self) -> Result<()> {
        if self.client.is_some() {
            return Ok(());
        }

        self.transition(ActorEvent::Dial);
        match self.dial().await {
            Ok(client) => {
                self.generation += 1;
                self.watch(&client);
                self.client = Some(client);
                self.backoff
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .reset();
                self.transition(ActorEvent::DialSucceeded);
                info!(peripheral = %self.name, "Peripheral connected");
                Ok(())
            }
            Err(e) => {
                self.transition(ActorEvent::DialFailed);
                warn!(peripheral = %self.name, error = %e, "Failed to connect peripheral");
                Err(e)
            }
        }
    }

    async fn dial(&self) -> Result<C::Client> {
        let client = timeout(self.options.connect_timeout, self.connector.connect())
            .await
            .map_err(|_| HardwareError::timeout(self.options.connect_timeout))??;

        if let Err(e) = self.restore_subscriptions(&client).await {
            if let Err(cancel) = client.cancel_connection().await {
                debug!(peripheral = %self.name, error = %cancel, "Error while cancelling connection");
            }
            return Err(e);
        }
        Ok(client)
    }

    async fn restore_subscriptions(&self, client: &C::Client) -> Result<()> {
        if self.subscriptions.is_empty() {
            return Ok(());
        }

        let profile = client
            .profile()
            .ok_or_else(|| HardwareError::ProfileNotFound {
                peripheral: self.name.clone(),
            })?;
        for (key, handler) in &self.subscriptions {
            let characteristic = profile.find(key)?;
            let indicate = self.options.indicate(characteristic.capabilities);
            client
                .subscribe(characteristic, indicate, handler.clone())
                .await?;
        }
        debug!(peripheral = %self.name, count = self.subscriptions.len(), "Subscriptions restored");
        Ok(())
    }

    fn watch(&self, client: &C::Client) {
        let lost = client.disconnected();
        let requests = self.requests.clone();
        let done = self.done.clone();
        let generation = self.generation;

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = done.cancelled() => {}
                _ = lost.cancelled() => {
                    let (reply, _) = oneshot::channel();
                    let op = Operation::ConnectionLost { generation };
                    let _ = requests.send(Request { op, reply }).await;
                }
            }
        });
    }

    fn on_connection_lost(&mut self, generation: u64) {
        if generation != self.generation || self.client.take().is_none() {
            return;
        }

        let auto_reconnect = self.options.auto_reconnect;
        self.transition(ActorEvent::ConnectionLost { auto_reconnect });
        warn!(peripheral = %self.name, auto_reconnect, "Peripheral connection lost");

        if let Some(handler) = &self.options.on_connection_lost {
            handler(&HardwareError::connection_closed(&self.name));
        }
        if auto_reconnect {
            self.spawn_reconnect();
        }
    }

    fn spawn_reconnect(&mut self) {
        let requests = self.requests.clone();
        let done = self.done.clone();
        let name = self.name.clone();
        let backoff = self.backoff.clone();

        let task = tokio::spawn(async move {
            loop {
                let (reply, response) = oneshot::channel();
                let request = Request {
                    op: Operation::Reconnect,
                    reply,
                };
                tokio::select! {
                    biased;
                    _ = done.cancelled() => return,
                    sent = requests.send(request) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }

                match response.await {
                    Ok(Ok(_)) => {
                        info!(peripheral = %name, "Peripheral reconnected");
                        return;
                    }
                    Ok(Err(e)) => {
                        let delay = backoff
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .next_delay();
                        warn!(
                            peripheral = %name,
                            error = %e,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "Reconnect failed, retrying"
                        );
                        tokio::select! {
                            biased;
                            _ = done.cancelled() => return,
                            _ = sleep(delay) => {}
                        }
                    }
                    Err(_) => return,
                }
            }
        });

        if let Some(previous) = self.reconnect_task.replace(task) {
            previous.abort();
        }
    }

    fn transition(&self, event: ActorEvent) {
        let from = *self.state.borrow();
        let to = from.next(event);
        if from != to {
            debug!(peripheral = %self.name, %from, %to, "Actor state changed");
            self.state.send_replace(to);
        }
    }
}
