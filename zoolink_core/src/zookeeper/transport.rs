//! The seam between the connection supervision and the library that speaks the zookeeper
//! protocol. `ZkTransport` (zoo_keeper_client.rs) is the production implementation.

use super::auth_config::{AclProvider, Credential};
use super::retry_policy::RetryPolicy;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Raw session states reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reconnected,
    Suspended,
    Lost,
    ReadOnly,
    Closed,
}

/// Events on the transport protocol stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// The client is being closed, sent once.
    Closing,
    /// A notification delivered to the default watcher.
    Watched { event_type: String, path: Option<String> },
}

/// Receives the notifications of a transport. Invoked on the transport's own threads.
pub trait TransportObserver: Send + Sync {
    fn state_changed(&self, state: ConnectionState);
    fn protocol_event(&self, event: &ProtocolEvent);
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("zookeeper-async error {0:?}")]
    ZookeeperAsync(#[from] zookeeper_async::ZkError),
    #[error("No session established within {0:?}")]
    SessionTimeout(Duration),
    #[error("No tokio runtime available to drive the transport")]
    NoRuntime,
    #[error("Transport already started")]
    AlreadyStarted,
    #[error("Transport is closed")]
    Closed,
    #[error("Handshake interrupted: {0}")]
    Interrupted(String),
}

/// Credentials plus the ACL provider applied to the nodes created with them.
#[derive(Clone)]
pub struct Authorization {
    pub credentials: Vec<Credential>,
    pub acl_provider: Arc<dyn AclProvider>,
}

impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorization")
            .field("credentials", &self.credentials)
            .field("acl_provider", &self.acl_provider)
            .finish()
    }
}

/// Everything a `TransportBuilder` needs to produce a client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// comma separated host:port pairs, optionally followed by a /chroot path
    pub connect_string: String,
    pub connection_timeout: Duration,
    pub session_timeout: Duration,
    pub retry_policy: RetryPolicy,
    /// None when no credentials were supplied
    pub authorization: Option<Authorization>,
}

#[async_trait]
pub trait TransportClient: Send + Sync + 'static {
    /// Observers must be subscribed before `start`, notifications are not replayed.
    fn subscribe(&self, observer: Arc<dyn TransportObserver>);

    /// Starts connecting in the background and returns right away.
    fn start(&self) -> Result<(), TransportError>;

    /// Waits up to `max_wait` for the session to be connected. Ok(false) on timeout.
    async fn block_until_connected(&self, max_wait: Duration) -> Result<bool, TransportError>;

    /// Terminal. Emits `ProtocolEvent::Closing` the first time, later calls do nothing.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

pub trait TransportBuilder: Send + Sync {
    type Client: TransportClient;

    fn build(&self, config: TransportConfig) -> Result<Self::Client, TransportError>;
}
