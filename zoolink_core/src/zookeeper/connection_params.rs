//! Describes one logical zookeeper connection: where to connect, how long to wait and which
//! credentials to present.

use super::auth_config::AuthConfig;
use super::retry_policy::RetryPolicy;
use super::ConnectionError;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::time::Duration;

/// A host name, an IPv4 address or a bracketed IPv6 address, then the port.
const HOST_PORT: &str = r"(?:\[[0-9A-Fa-f:.]+\]|[^,:/\s\[\]]+):\d{1,5}";

lazy_static! {
    /// host:port[,host:port...] followed by an optional /chroot path
    static ref CONNECT_STRING_PATTERN: Regex =
        Regex::new(&format!(r"^{0}(,{0})*(/\S*)?$", HOST_PORT)).unwrap();
}

/// Immutable once built, see `ConnectionParamsBuilder`.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    id: String,
    addresses: String,
    connection_timeout_ms: u32,
    session_timeout_ms: u32,
    retry_interval_ms: u32,
    max_retries: u32,
    credentials: Vec<String>,
}

impl ConnectionParams {
    pub fn builder(id: &str, addresses: &str) -> ConnectionParamsBuilder {
        ConnectionParamsBuilder::new(id, addresses)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn addresses(&self) -> &str {
        &self.addresses
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms.into())
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms.into())
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms.into())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The raw credential strings, as supplied.
    pub fn credentials(&self) -> &[String] {
        &self.credentials
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_interval(), self.max_retries)
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("id", &self.id)
            .field("addresses", &self.addresses)
            .field("connection_timeout_ms", &self.connection_timeout_ms)
            .field("session_timeout_ms", &self.session_timeout_ms)
            .field("retry_interval_ms", &self.retry_interval_ms)
            .field("max_retries", &self.max_retries)
            .field("credentials", &format!("<{} redacted>", self.credentials.len()))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionParamsBuilder {
    params: ConnectionParams,
}

impl ConnectionParamsBuilder {
    /// Defaults match the ones of the properties configuration.
    pub fn new(id: &str, addresses: &str) -> Self {
        Self {
            params: ConnectionParams {
                id: id.to_string(),
                addresses: addresses.to_string(),
                connection_timeout_ms: 15_000,
                session_timeout_ms: 60_000,
                retry_interval_ms: 1_000,
                max_retries: 3,
                credentials: vec![],
            },
        }
    }

    pub fn with_connection_timeout_ms(mut self, connection_timeout_ms: u32) -> Self {
        self.params.connection_timeout_ms = connection_timeout_ms;
        self
    }

    pub fn with_session_timeout_ms(mut self, session_timeout_ms: u32) -> Self {
        self.params.session_timeout_ms = session_timeout_ms;
        self
    }

    pub fn with_retry_interval_ms(mut self, retry_interval_ms: u32) -> Self {
        self.params.retry_interval_ms = retry_interval_ms;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.params.max_retries = max_retries;
        self
    }

    pub fn with_credential(mut self, credential: &str) -> Self {
        self.params.credentials.push(credential.to_string());
        self
    }

    pub fn with_credentials(mut self, credentials: Vec<String>) -> Self {
        self.params.credentials = credentials;
        self
    }

    /// `build` checks every invariant, credentials included, so that nothing invalid reaches a
    /// transport.
    pub fn build(self) -> Result<ConnectionParams, ConnectionError> {
        let params = self.params;
        if params.id.trim().is_empty() {
            return Err(ConnectionError::InvalidParams(String::from("id must not be blank")));
        }
        if !CONNECT_STRING_PATTERN.is_match(params.addresses.trim()) {
            return Err(ConnectionError::InvalidParams(format!(
                "addresses: '{}' is not a host:port[,host:port...][/chroot] list",
                params.addresses
            )));
        }
        for (name, value) in [
            ("connection_timeout_ms", params.connection_timeout_ms),
            ("session_timeout_ms", params.session_timeout_ms),
            ("retry_interval_ms", params.retry_interval_ms),
        ] {
            if value == 0 {
                return Err(ConnectionError::InvalidParams(format!("{} must be positive", name)));
            }
        }
        AuthConfig::parse(&params.credentials)?;
        Ok(ConnectionParams { addresses: params.addresses.trim().to_string(), ..params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn it_builds_with_defaults() {
        let params = ConnectionParams::builder("local", "127.0.0.1:2181").build().unwrap();
        assert_eq!(params.id(), "local");
        assert_eq!(params.addresses(), "127.0.0.1:2181");
        assert_eq!(params.connection_timeout(), Duration::from_secs(15));
        assert_eq!(params.session_timeout(), Duration::from_secs(60));
        assert_eq!(params.retry_policy(), RetryPolicy::new(Duration::from_secs(1), 3));
        assert!(params.credentials().is_empty());
    }

    #[test_log::test]
    fn it_accepts_clusters_and_chroots() {
        for addresses in
            ["zk1:2181,zk2:2181,zk3:2181", "10.0.0.1:2181/services", "localhost:2181/a/b", " zk:1 "]
        {
            assert!(
                ConnectionParams::builder("id", addresses).build().is_ok(),
                "{} should be accepted",
                addresses
            );
        }
    }

    #[test_log::test]
    fn it_accepts_bracketed_ipv6_hosts() {
        for addresses in ["[::1]:2181", "[fe80::1]:2181,10.0.0.1:2181/app", "zk1:2181,[::1]:2182"] {
            let params = ConnectionParams::builder("id", addresses).build().unwrap();
            assert_eq!(params.addresses(), addresses);
        }
    }

    #[test_log::test]
    fn it_rejects_invalid_values() {
        let invalid = [
            ConnectionParams::builder("  ", "127.0.0.1:2181"),
            ConnectionParams::builder("id", ""),
            ConnectionParams::builder("id", "127.0.0.1"),
            ConnectionParams::builder("id", "zk1:2181,,zk2:2181"),
            ConnectionParams::builder("id", "::1:2181"),
            ConnectionParams::builder("id", "[::1]"),
            ConnectionParams::builder("id", "[zk1]:2181"),
            ConnectionParams::builder("id", "127.0.0.1:2181").with_session_timeout_ms(0),
            ConnectionParams::builder("id", "127.0.0.1:2181").with_connection_timeout_ms(0),
            ConnectionParams::builder("id", "127.0.0.1:2181").with_retry_interval_ms(0),
        ];
        for builder in invalid {
            assert!(matches!(builder.build(), Err(ConnectionError::InvalidParams(_))));
        }
    }

    #[test_log::test]
    fn it_validates_credentials_before_any_connection() {
        let malformed =
            ConnectionParams::builder("id", "127.0.0.1:2181").with_credential("malformed").build();
        assert!(matches!(malformed, Err(ConnectionError::InvalidCredentialFormat(_))));
        let blank_secret =
            ConnectionParams::builder("id", "127.0.0.1:2181").with_credential("digest:").build();
        assert!(matches!(blank_secret, Err(ConnectionError::InvalidCredentialFormat(_))));
        let params = ConnectionParams::builder("id", "127.0.0.1:2181")
            .with_credentials(vec![String::from("digest:user:pass"), String::from(" ")])
            .build()
            .unwrap();
        assert_eq!(params.credentials().len(), 2);
        assert!(!format!("{:?}", params).contains("user:pass"));
    }
}
