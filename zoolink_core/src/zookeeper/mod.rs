//! Zookeeper connection establishment and supervision.
//! The `ConnectionFactory` turns `ConnectionParams` into a `ZookeeperConnection`, either waiting
//! for the session (`create`) or handing the lifecycle to caller listeners after an initial
//! handshake (`create_async`).

pub mod auth_config;
pub mod connection_factory;
pub mod connection_params;
pub mod listener_registry;
#[cfg(test)]
pub(crate) mod mock_transport;
pub mod retry_policy;
pub mod state_machine;
pub mod transport;
pub mod zoo_keeper_client;

pub use self::connection_factory::{ConnectionFactory, ZookeeperConnection};
pub use self::connection_params::ConnectionParams;
pub use self::listener_registry::{ConnectionListener, ListenerResult};
pub use self::zoo_keeper_client::{ZkTransport, ZkTransportBuilder};

use self::transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Invalid credential format: {0}")]
    InvalidCredentialFormat(String),
    #[error("Invalid connection params: {0}")]
    InvalidParams(String),
    /// The handshake missed its deadline or failed, the transport has been closed.
    #[error("connect {addresses} failed")]
    ConnectTimeout {
        addresses: String,
        #[source]
        source: Option<TransportError>,
    },
    #[error("Transport {0}")]
    Transport(#[from] TransportError),
}
