//! A ZooKeeper transport on top of zookeeper-async.
//! Notes:
//! - The library does not take a retry policy. The first session is established by a supervision
//!   task that applies the `RetryPolicy` around `ZooKeeper::connect_with_retry_time`, the base
//!   sleep doubles as the pause between refused TCP connects inside the library.
//! - Once connected the library reconnects on its own, and also replaces an expired session,
//!   which it reports as `ZkState::NotConnected`. That is published as `Lost`.
//! - Authentication is bound to the TCP connection, not to the session. After every reconnection
//!   the supervision task registers the credentials again before publishing `Reconnected`.
//! - If the credentials cannot be restored within the retry policy, the transport closes itself.

use super::auth_config::Credential;
use super::transport::{
    ConnectionState, ProtocolEvent, TransportBuilder, TransportClient, TransportConfig,
    TransportError, TransportObserver,
};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};
use tracing_attributes::instrument;
use zookeeper_async::{WatchedEvent, Watcher, ZkError, ZkState, ZooKeeper};

/// Forwards the default watcher notifications as protocol events.
struct ForwardingWatcher {
    shared: Weak<ZkShared>,
}

impl Watcher for ForwardingWatcher {
    fn handle(&self, e: WatchedEvent) {
        if let Some(shared) = self.shared.upgrade() {
            shared.emit(&ProtocolEvent::Watched {
                event_type: format!("{:?}", e.event_type),
                path: e.path,
            });
        }
    }
}

/// Registers credentials on the current connection of a session.
#[async_trait]
trait SessionAuthenticator: Send + Sync {
    async fn authenticate(&self, credential: &Credential) -> Result<(), ZkError>;
}

#[async_trait]
impl SessionAuthenticator for ZooKeeper {
    async fn authenticate(&self, credential: &Credential) -> Result<(), ZkError> {
        self.add_auth(credential.scheme(), credential.auth_bytes()).await
    }
}

/// State shared between the transport handle, the supervision task and the library listeners.
struct ZkShared {
    config: TransportConfig,
    observers: RwLock<Vec<Arc<dyn TransportObserver>>>,
    zookeeper: RwLock<Option<Arc<ZooKeeper>>>,
    connected: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    /// raised by the library listener when a reconnection needs its credentials back
    reauthenticate: Notify,
    started: AtomicBool,
    closed: AtomicBool,
    /// a session has been established at least once
    has_connected: AtomicBool,
    /// the connection was lost, the next Connected is a reconnection
    suspended: AtomicBool,
}

impl ZkShared {
    fn new(config: TransportConfig) -> Self {
        let (connected, _) = watch::channel(false);
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            observers: RwLock::new(vec![]),
            zookeeper: RwLock::new(None),
            connected,
            shutdown,
            reauthenticate: Notify::new(),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            has_connected: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn credentials(&self) -> &[Credential] {
        match &self.config.authorization {
            Some(authorization) => authorization.credentials.as_slice(),
            None => &[],
        }
    }

    /// The observers are copied out so that none of them runs under the lock, an observer may
    /// close the transport from its callback.
    fn observers(&self) -> Vec<Arc<dyn TransportObserver>> {
        self.observers.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    fn set_zookeeper(&self, zookeeper: Option<Arc<ZooKeeper>>) {
        *self.zookeeper.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = zookeeper;
    }

    fn publish(&self, state: ConnectionState) {
        if self.is_closed() {
            debug!("Transport closed, dropping {:?}", state);
            return;
        }
        for observer in self.observers() {
            observer.state_changed(state);
        }
    }

    fn emit(&self, event: &ProtocolEvent) {
        for observer in self.observers() {
            observer.protocol_event(event);
        }
    }

    /// Terminal. Returns false when the transport was already closed.
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("Closing zookeeper transport for {}", self.config.connect_string);
        self.emit(&ProtocolEvent::Closing);
        self.connected.send_replace(false);
        self.shutdown.send_replace(true);
        true
    }

    /// `give_up` is called once the retry policy is exhausted. Before the first session the
    /// caller deadline decides, afterwards the connection is unrecoverable and gets closed.
    fn give_up(&self) {
        self.publish(ConnectionState::Lost);
        if self.has_connected.load(Ordering::SeqCst) {
            error!("Connection to {} is unrecoverable, closing it", self.config.connect_string);
            self.close();
        }
    }

    /// `on_zk_state` translates the library session states. Called on the library threads.
    #[allow(deprecated)]
    fn on_zk_state(&self, state: ZkState) {
        if self.is_closed() {
            return;
        }
        debug!("zookeeper-async state {:?} for {}", state, self.config.connect_string);
        let translated = match state {
            ZkState::Connected => {
                if !self.suspended.swap(false, Ordering::SeqCst) {
                    // The first Connected of a session is published once the session is set up.
                    self.connected.send_replace(true);
                    None
                } else if self.credentials().is_empty() {
                    self.connected.send_replace(true);
                    Some(ConnectionState::Reconnected)
                } else {
                    debug!("Connection restored, registering the credentials again");
                    self.reauthenticate.notify_one();
                    None
                }
            },
            ZkState::Connecting => {
                self.connected.send_replace(false);
                let was_suspended = self.suspended.swap(true, Ordering::SeqCst);
                (self.has_connected.load(Ordering::SeqCst) && !was_suspended)
                    .then(|| ConnectionState::Suspended)
            },
            ZkState::NotConnected => {
                warn!("Session on {} expired", self.config.connect_string);
                self.connected.send_replace(false);
                self.suspended.store(true, Ordering::SeqCst);
                Some(ConnectionState::Lost)
            },
            ZkState::ConnectedReadOnly => Some(ConnectionState::ReadOnly),
            // Only reported after a close request.
            ZkState::Closed | ZkState::AuthFailed => Some(ConnectionState::Closed),
            ZkState::Associating => None,
        };
        if let Some(translated) = translated {
            self.publish(translated);
        }
    }

    async fn authenticate_all<A>(&self, session: &A) -> Result<(), ZkError>
    where
        A: SessionAuthenticator + ?Sized,
    {
        for credential in self.credentials() {
            session.authenticate(credential).await?;
        }
        Ok(())
    }

    /// `connect_once` establishes one session and registers the credentials, all bounded by the
    /// connection timeout. The session is only considered live once a request went through.
    async fn connect_once(self: &Arc<Self>) -> Result<Arc<ZooKeeper>, TransportError> {
        let watcher = ForwardingWatcher { shared: Arc::downgrade(self) };
        let within = self.config.connection_timeout;
        let zookeeper = match tokio::time::timeout(
            within,
            ZooKeeper::connect_with_retry_time(
                &self.config.connect_string,
                self.config.session_timeout,
                watcher,
                self.config.retry_policy.base_sleep(),
            ),
        )
        .await
        {
            Ok(zookeeper) => zookeeper?,
            Err(_) => return Err(TransportError::SessionTimeout(within)),
        };
        let handshake = async {
            self.authenticate_all(&zookeeper).await?;
            zookeeper.exists("/", false).await?;
            Ok::<(), ZkError>(())
        };
        let outcome = match tokio::time::timeout(within, handshake).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(TransportError::ZookeeperAsync(err)),
            Err(_) => Err(TransportError::SessionTimeout(within)),
        };
        if let Err(err) = outcome {
            error!("Session handshake with {} failed: {}", self.config.connect_string, err);
            close_session(&zookeeper, within).await;
            return Err(err);
        }
        let shared = Arc::downgrade(self);
        zookeeper.add_listener(move |state| {
            if let Some(shared) = shared.upgrade() {
                shared.on_zk_state(state);
            }
        });
        let zookeeper = Arc::new(zookeeper);
        self.set_zookeeper(Some(zookeeper.clone()));
        self.suspended.store(false, Ordering::SeqCst);
        self.connected.send_replace(true);
        self.has_connected.store(true, Ordering::SeqCst);
        self.publish(ConnectionState::Connected);
        Ok(zookeeper)
    }

    /// `establish_session` retries `connect_once` until it succeeds or the retry policy gives up.
    async fn establish_session(self: &Arc<Self>) -> Option<Arc<ZooKeeper>> {
        let started = Instant::now();
        let mut attempt = 0;
        loop {
            match self.connect_once().await {
                Ok(zookeeper) => {
                    info!("Connection to zookeeper {} successful", self.config.connect_string);
                    return Some(zookeeper);
                },
                Err(err) => warn!(
                    "Attempt {} to connect to {} failed: {}",
                    attempt, self.config.connect_string, err
                ),
            }
            match self.config.retry_policy.allow_retry(attempt, started.elapsed()) {
                Some(delay) => {
                    debug!("Retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                None => {
                    error!(
                        "Giving up on {} after {} attempt(s)",
                        self.config.connect_string,
                        attempt + 1
                    );
                    return None;
                },
            }
        }
    }

    /// `restore_session` registers the credentials on a reconnected session, retried with the
    /// retry policy, and then publishes `Reconnected`.
    async fn restore_session<A>(&self, session: &A) -> Result<(), TransportError>
    where
        A: SessionAuthenticator + ?Sized,
    {
        let within = self.config.connection_timeout;
        let started = Instant::now();
        let mut attempt = 0;
        loop {
            let err = match tokio::time::timeout(within, self.authenticate_all(session)).await {
                Ok(Ok(())) => {
                    if self.suspended.load(Ordering::SeqCst) {
                        debug!("Connection lost again while restoring the credentials");
                    } else {
                        self.connected.send_replace(true);
                        self.publish(ConnectionState::Reconnected);
                    }
                    return Ok(());
                },
                Ok(Err(err)) => TransportError::ZookeeperAsync(err),
                Err(_) => TransportError::SessionTimeout(within),
            };
            warn!("Attempt {} to restore the credentials failed: {}", attempt, err);
            match self.config.retry_policy.allow_retry(attempt, started.elapsed()) {
                Some(delay) => {
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                None => return Err(err),
            }
        }
    }
}

/// Resolves once the flag is raised, or right away when its sender is gone.
async fn raised(flag: &mut watch::Receiver<bool>) -> bool {
    flag.wait_for(|raised| *raised).await.is_ok()
}

/// A session that never connected does not answer the close request, so it is bounded.
async fn close_session(zookeeper: &ZooKeeper, within: Duration) {
    match tokio::time::timeout(within, zookeeper.close()).await {
        Ok(Ok(())) => debug!("zookeeper session closed"),
        Ok(Err(err)) => warn!("Unable to close zookeeper session: {:?}", err),
        Err(_) => warn!("zookeeper session did not acknowledge the close within {:?}", within),
    }
}

/// `supervise` owns the session of one transport until it is closed.
async fn supervise(shared: Arc<ZkShared>, mut shutdown: watch::Receiver<bool>) {
    let zookeeper = tokio::select! {
        _ = raised(&mut shutdown) => return,
        zookeeper = shared.establish_session() => zookeeper,
    };
    let zookeeper = match zookeeper {
        Some(zookeeper) => zookeeper,
        None => {
            shared.give_up();
            return;
        },
    };
    loop {
        let restored = tokio::select! {
            _ = raised(&mut shutdown) => break,
            _ = shared.reauthenticate.notified() => tokio::select! {
                _ = raised(&mut shutdown) => break,
                restored = shared.restore_session(&*zookeeper) => restored,
            },
        };
        if let Err(err) = restored {
            error!("Unable to restore the session on {}: {}", shared.config.connect_string, err);
            shared.give_up();
            break;
        }
    }
    shared.set_zookeeper(None);
    close_session(&zookeeper, shared.config.connection_timeout).await;
}

pub struct ZkTransport {
    shared: Arc<ZkShared>,
}

impl fmt::Debug for ZkTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZkTransport")
            .field("config", &self.shared.config)
            .field("started", &self.shared.started.load(Ordering::SeqCst))
            .field("closed", &self.shared.is_closed())
            .field("connected", &*self.shared.connected.borrow())
            .finish()
    }
}

impl ZkTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self { shared: Arc::new(ZkShared::new(config)) }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.shared.config
    }

    /// The current library session, if any, for coordination operations.
    pub fn zookeeper(&self) -> Option<Arc<ZooKeeper>> {
        self.shared.zookeeper.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

#[async_trait]
impl TransportClient for ZkTransport {
    fn subscribe(&self, observer: Arc<dyn TransportObserver>) {
        self.shared.observers.write().unwrap_or_else(|poisoned| poisoned.into_inner()).push(observer);
    }

    #[instrument]
    fn start(&self) -> Result<(), TransportError> {
        if self.shared.is_closed() {
            return Err(TransportError::Closed);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadyStarted);
        }
        runtime.spawn(supervise(self.shared.clone(), self.shared.shutdown.subscribe()));
        Ok(())
    }

    async fn block_until_connected(&self, max_wait: Duration) -> Result<bool, TransportError> {
        let mut connected = self.shared.connected.subscribe();
        let mut shutdown = self.shared.shutdown.subscribe();
        let wait = async {
            tokio::select! {
                session = raised(&mut connected) => session,
                _ = raised(&mut shutdown) => false,
            }
        };
        match tokio::time::timeout(max_wait, wait).await {
            Ok(true) if !self.shared.is_closed() => Ok(true),
            Ok(_) => Err(TransportError::Closed),
            Err(_) => Ok(false),
        }
    }

    fn close(&self) {
        self.shared.close();
    }

    fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

/// Builds `ZkTransport`s, one per connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZkTransportBuilder;

impl TransportBuilder for ZkTransportBuilder {
    type Client = ZkTransport;

    fn build(&self, config: TransportConfig) -> Result<ZkTransport, TransportError> {
        debug!("Building zookeeper transport for {}", config.connect_string);
        Ok(ZkTransport::new(config))
    }
}
