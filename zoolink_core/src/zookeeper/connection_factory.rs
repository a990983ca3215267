//! Builds transports out of `ConnectionParams` and runs the initial handshake.
//! Two flavours:
//! - `create`: waits up to 5 seconds for the session, no listeners. Meant for one-shot work.
//! - `create_async`: wires the listeners through a `ConnectionStateMachine` first, then waits up
//!   to 3 seconds for the first session only. Anything after that is reported to the listeners,
//!   never returned as an error.

use super::auth_config::{AclProvider, AuthConfig, CreatorAllAclProvider};
use super::connection_params::ConnectionParams;
use super::listener_registry::{ConnectionListener, ListenerRegistry};
use super::state_machine::{ConnectionStateMachine, LifecycleState};
use super::transport::{Authorization, TransportBuilder, TransportClient, TransportConfig};
use super::ConnectionError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_attributes::instrument;
use zookeeper_async::Acl;

/// Deadline of the `create` handshake.
pub const SYNC_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Deadline of the initial `create_async` handshake.
pub const ASYNC_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// A live connection. Closing it, explicitly or by dropping it, is terminal.
pub struct ZookeeperConnection<C: TransportClient> {
    id: String,
    client: Arc<C>,
    acl_provider: Option<Arc<dyn AclProvider>>,
    state_machine: Option<Arc<ConnectionStateMachine<C>>>,
}

impl<C: TransportClient> fmt::Debug for ZookeeperConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZookeeperConnection")
            .field("id", &self.id)
            .field("closed", &self.client.is_closed())
            .field("acl_provider", &self.acl_provider)
            .field("lifecycle_state", &self.lifecycle_state())
            .finish()
    }
}

impl<C: TransportClient> ZookeeperConnection<C> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The transport, for downstream coordination operations.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// `acl_for_path` returns the ACLs to attach to a node created at `path`: creator only once
    /// credentials were supplied, open otherwise.
    pub fn acl_for_path(&self, path: &str) -> Vec<Acl> {
        match &self.acl_provider {
            Some(provider) => provider.acl_for_path(path),
            None => Acl::open_unsafe().to_vec(),
        }
    }

    pub fn has_acl_provider(&self) -> bool {
        self.acl_provider.is_some()
    }

    /// Only connections made by `create_async` track their lifecycle.
    pub fn lifecycle_state(&self) -> Option<LifecycleState> {
        self.state_machine.as_ref().map(|machine| machine.state())
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Idempotent.
    pub fn close(&self) {
        if !self.client.is_closed() {
            info!("Closing connection {}", self.id);
        }
        self.client.close();
    }
}

impl<C: TransportClient> Drop for ZookeeperConnection<C> {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct ConnectionFactory<B> {
    transport_builder: B,
}

impl<B: TransportBuilder> ConnectionFactory<B> {
    pub fn new(transport_builder: B) -> Self {
        Self { transport_builder }
    }

    pub fn transport_builder(&self) -> &B {
        &self.transport_builder
    }

    /// `create` connects and waits up to `SYNC_CONNECT_TIMEOUT` for the session.
    #[instrument(skip(self, params), fields(id = %params.id(), addresses = %params.addresses()))]
    pub async fn create(
        &self,
        params: &ConnectionParams,
    ) -> Result<ZookeeperConnection<B::Client>, ConnectionError> {
        let (client, acl_provider) = self.build_client(params)?;
        Self::handshake(&client, params, SYNC_CONNECT_TIMEOUT).await?;
        info!("Connected to {}", params.addresses());
        Ok(ZookeeperConnection {
            id: params.id().to_string(),
            client,
            acl_provider,
            state_machine: None,
        })
    }

    /// `create_async` subscribes the listeners before starting the transport and then waits up to
    /// `ASYNC_CONNECT_TIMEOUT` for the first session. Later transitions only reach the listeners.
    #[instrument(skip(self, params, listeners), fields(id = %params.id(), addresses = %params.addresses()))]
    pub async fn create_async(
        &self,
        params: &ConnectionParams,
        listeners: Vec<Arc<dyn ConnectionListener>>,
    ) -> Result<ZookeeperConnection<B::Client>, ConnectionError> {
        let (client, acl_provider) = self.build_client(params)?;
        debug!("Wiring {} listener(s)", listeners.len());
        let state_machine = Arc::new(ConnectionStateMachine::new(
            params.id(),
            ListenerRegistry::from(listeners),
            Arc::downgrade(&client),
        ));
        client.subscribe(state_machine.clone());
        Self::handshake(&client, params, ASYNC_CONNECT_TIMEOUT).await?;
        info!("Connected to {}, supervising the session", params.addresses());
        Ok(ZookeeperConnection {
            id: params.id().to_string(),
            client,
            acl_provider,
            state_machine: Some(state_machine),
        })
    }

    /// `transport_config` derives the credentials and picks the ACL provider. Nothing touches the
    /// network yet.
    pub fn transport_config(params: &ConnectionParams) -> Result<TransportConfig, ConnectionError> {
        let credentials = AuthConfig::parse(params.credentials())?;
        let authorization = if credentials.is_empty() {
            None
        } else {
            debug!("Using {} credential(s) with creator only ACLs", credentials.len());
            let acl_provider: Arc<dyn AclProvider> = Arc::new(CreatorAllAclProvider);
            Some(Authorization { credentials, acl_provider })
        };
        Ok(TransportConfig {
            connect_string: params.addresses().to_string(),
            connection_timeout: params.connection_timeout(),
            session_timeout: params.session_timeout(),
            retry_policy: params.retry_policy(),
            authorization,
        })
    }

    fn build_client(
        &self,
        params: &ConnectionParams,
    ) -> Result<(Arc<B::Client>, Option<Arc<dyn AclProvider>>), ConnectionError> {
        let config = Self::transport_config(params)?;
        let acl_provider =
            config.authorization.as_ref().map(|authorization| authorization.acl_provider.clone());
        let client = self.transport_builder.build(config)?;
        Ok((Arc::new(client), acl_provider))
    }

    /// Starts the client and waits for the session. Every failure closes the client and becomes
    /// a `ConnectTimeout`. The outer timeout holds even if the transport ignores `max_wait`.
    async fn handshake(
        client: &B::Client,
        params: &ConnectionParams,
        max_wait: Duration,
    ) -> Result<(), ConnectionError> {
        let source = match client.start() {
            Err(err) => Some(err),
            Ok(()) => match tokio::time::timeout(max_wait, client.block_until_connected(max_wait)).await {
                Ok(Ok(true)) => return Ok(()),
                Ok(Ok(false)) | Err(_) => None,
                Ok(Err(err)) => Some(err),
            },
        };
        warn!("Unable to connect to {} within {:?}: {:?}", params.addresses(), max_wait, source);
        client.close();
        Err(ConnectionError::ConnectTimeout { addresses: params.addresses().to_string(), source })
    }
}
