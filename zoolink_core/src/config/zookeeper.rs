//! Zookeeper connection configuration
use super::{ConfigError, ConfigSet};
use crate::common::config_def::{ConfigDef, ConfigDefImportance};
use crate::zookeeper::ConnectionParams;
use const_format::concatcp;
use enum_iterator::IntoEnumIterator;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use tracing::{trace, warn};

pub const CONNECTION_ID_PROP: &str = "connection.id";
pub const ZK_CONNECT_PROP: &str = "zookeeper.connect";
pub const ZK_SESSION_TIMEOUT_PROP: &str = "zookeeper.session.timeout.ms";
pub const ZK_CONNECTION_TIMEOUT_PROP: &str = "zookeeper.connection.timeout.ms";
pub const ZK_RETRY_INTERVAL_PROP: &str = "zookeeper.retry.interval.ms";
pub const ZK_MAX_RETRIES_PROP: &str = "zookeeper.max.retries";
pub const ZK_ACL_PROP: &str = "zookeeper.acl";

pub const CONNECTION_ID_DOC: &str =
    "Identifier of the connection, reported to the listeners. A random UUID when unset.";
pub const ZK_CONNECT_DOC: &str = "Specifies the ZooKeeper connection string in the form \
    <code>hostname:port</code>. Multiple hosts are given as \
    <code>hostname1:port1,hostname2:port2,hostname3:port3</code>, optionally followed by a chroot \
    path such as <code>/chroot/path</code>.";
pub const ZK_SESSION_TIMEOUT_DOC: &str = "Zookeeper session timeout";
pub const ZK_CONNECTION_TIMEOUT_DOC: &str = concatcp!(
    "The max time that the client waits to establish a session with zookeeper. Should not exceed ",
    ZK_SESSION_TIMEOUT_PROP
);
pub const ZK_RETRY_INTERVAL_DOC: &str = concatcp!(
    "Base sleep between connection attempts, doubled on every retry up to ",
    ZK_MAX_RETRIES_PROP,
    " attempts."
);
pub const ZK_MAX_RETRIES_DOC: &str = "Maximum number of connection retries, at most 29.";
pub const ZK_ACL_DOC: &str = "Comma separated <code>scheme:secret</code> credentials, for example \
    <code>digest:user:password</code>. When set, nodes are created with creator only ACLs.";

#[derive(Debug, IntoEnumIterator)]
pub enum ZookeeperConfigKey {
    ConnectionId,
    ZkConnect,
    ZkSessionTimeoutMs,
    ZkConnectionTimeoutMs,
    ZkRetryIntervalMs,
    ZkMaxRetries,
    ZkAcl,
}

impl fmt::Display for ZookeeperConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionId => write!(f, "{}", CONNECTION_ID_PROP),
            Self::ZkConnect => write!(f, "{}", ZK_CONNECT_PROP),
            Self::ZkSessionTimeoutMs => write!(f, "{}", ZK_SESSION_TIMEOUT_PROP),
            Self::ZkConnectionTimeoutMs => write!(f, "{}", ZK_CONNECTION_TIMEOUT_PROP),
            Self::ZkRetryIntervalMs => write!(f, "{}", ZK_RETRY_INTERVAL_PROP),
            Self::ZkMaxRetries => write!(f, "{}", ZK_MAX_RETRIES_PROP),
            Self::ZkAcl => write!(f, "{}", ZK_ACL_PROP),
        }
    }
}

impl FromStr for ZookeeperConfigKey {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            CONNECTION_ID_PROP => Ok(Self::ConnectionId),
            ZK_CONNECT_PROP => Ok(Self::ZkConnect),
            ZK_SESSION_TIMEOUT_PROP => Ok(Self::ZkSessionTimeoutMs),
            ZK_CONNECTION_TIMEOUT_PROP => Ok(Self::ZkConnectionTimeoutMs),
            ZK_RETRY_INTERVAL_PROP => Ok(Self::ZkRetryIntervalMs),
            ZK_MAX_RETRIES_PROP => Ok(Self::ZkMaxRetries),
            ZK_ACL_PROP => Ok(Self::ZkAcl),
            _ => Err(ConfigError::UnknownKey(input.to_string())),
        }
    }
}

/// The raw credentials of `zookeeper.acl`, blank entries dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialList(pub Vec<String>);

impl FromStr for CredentialList {
    type Err = Infallible;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Ok(Self(
            input
                .split(',')
                .map(str::trim)
                .filter(|credential| !credential.is_empty())
                .map(String::from)
                .collect(),
        ))
    }
}

#[derive(Debug)]
pub struct ZookeeperConfigProperties {
    connection_id: ConfigDef<String>,
    zk_connect: ConfigDef<String>,
    zk_session_timeout_ms: ConfigDef<u32>,
    zk_connection_timeout_ms: ConfigDef<u32>,
    zk_retry_interval_ms: ConfigDef<u32>,
    zk_max_retries: ConfigDef<u32>,
    zk_acl: ConfigDef<CredentialList>,
}

impl Default for ZookeeperConfigProperties {
    fn default() -> Self {
        Self {
            connection_id: ConfigDef::default()
                .with_key(CONNECTION_ID_PROP)
                .with_importance(ConfigDefImportance::Low)
                .with_doc(CONNECTION_ID_DOC)
                .with_default(uuid::Uuid::new_v4().to_string()),
            zk_connect: ConfigDef::default()
                .with_key(ZK_CONNECT_PROP)
                .with_importance(ConfigDefImportance::High)
                .with_doc(ZK_CONNECT_DOC),
            zk_session_timeout_ms: ConfigDef::default()
                .with_key(ZK_SESSION_TIMEOUT_PROP)
                .with_importance(ConfigDefImportance::High)
                .with_doc(ZK_SESSION_TIMEOUT_DOC)
                .with_default(60_000)
                .with_validator(Box::new(|data| {
                    ConfigDef::at_least(data, &1, ZK_SESSION_TIMEOUT_PROP)
                })),
            zk_connection_timeout_ms: ConfigDef::default()
                .with_key(ZK_CONNECTION_TIMEOUT_PROP)
                .with_importance(ConfigDefImportance::High)
                .with_doc(ZK_CONNECTION_TIMEOUT_DOC)
                .with_default(15_000)
                .with_validator(Box::new(|data| {
                    ConfigDef::at_least(data, &1, ZK_CONNECTION_TIMEOUT_PROP)
                })),
            zk_retry_interval_ms: ConfigDef::default()
                .with_key(ZK_RETRY_INTERVAL_PROP)
                .with_importance(ConfigDefImportance::Medium)
                .with_doc(ZK_RETRY_INTERVAL_DOC)
                .with_default(1_000)
                .with_validator(Box::new(|data| {
                    ConfigDef::at_least(data, &1, ZK_RETRY_INTERVAL_PROP)
                })),
            zk_max_retries: ConfigDef::default()
                .with_key(ZK_MAX_RETRIES_PROP)
                .with_importance(ConfigDefImportance::Medium)
                .with_doc(ZK_MAX_RETRIES_DOC)
                .with_default(3),
            zk_acl: ConfigDef::default()
                .with_key(ZK_ACL_PROP)
                .with_importance(ConfigDefImportance::Medium)
                .with_doc(ZK_ACL_DOC)
                .with_default(CredentialList::default()),
        }
    }
}

impl ZookeeperConfigProperties {
    /// `describe` lists every property as `key (importance): doc`.
    pub fn describe(&self) -> Vec<String> {
        vec![
            format!(
                "{} ({}): {}",
                self.connection_id.key(),
                self.connection_id.get_importance(),
                self.connection_id.doc()
            ),
            format!(
                "{} ({}): {}",
                self.zk_connect.key(),
                self.zk_connect.get_importance(),
                self.zk_connect.doc()
            ),
            format!(
                "{} ({}): {}",
                self.zk_session_timeout_ms.key(),
                self.zk_session_timeout_ms.get_importance(),
                self.zk_session_timeout_ms.doc()
            ),
            format!(
                "{} ({}): {}",
                self.zk_connection_timeout_ms.key(),
                self.zk_connection_timeout_ms.get_importance(),
                self.zk_connection_timeout_ms.doc()
            ),
            format!(
                "{} ({}): {}",
                self.zk_retry_interval_ms.key(),
                self.zk_retry_interval_ms.get_importance(),
                self.zk_retry_interval_ms.doc()
            ),
            format!(
                "{} ({}): {}",
                self.zk_max_retries.key(),
                self.zk_max_retries.get_importance(),
                self.zk_max_retries.doc()
            ),
            format!(
                "{} ({}): {}",
                self.zk_acl.key(),
                self.zk_acl.get_importance(),
                self.zk_acl.doc()
            ),
        ]
    }
}

impl ConfigSet for ZookeeperConfigProperties {
    type ConfigKey = ZookeeperConfigKey;
    type ConfigType = ConnectionParams;

    fn try_set_property(
        &mut self,
        property_name: &str,
        property_value: &str,
    ) -> Result<(), ConfigError> {
        let config_key = Self::ConfigKey::from_str(property_name)?;
        match config_key {
            Self::ConfigKey::ConnectionId => {
                self.connection_id.try_set_parsed_value(property_value)?
            },
            Self::ConfigKey::ZkConnect => self.zk_connect.try_set_parsed_value(property_value)?,
            Self::ConfigKey::ZkSessionTimeoutMs => {
                self.zk_session_timeout_ms.try_set_parsed_value(property_value)?
            },
            Self::ConfigKey::ZkConnectionTimeoutMs => {
                self.zk_connection_timeout_ms.try_set_parsed_value(property_value)?
            },
            Self::ConfigKey::ZkRetryIntervalMs => {
                self.zk_retry_interval_ms.try_set_parsed_value(property_value)?
            },
            Self::ConfigKey::ZkMaxRetries => {
                self.zk_max_retries.try_set_parsed_value(property_value)?
            },
            Self::ConfigKey::ZkAcl => self.zk_acl.try_set_parsed_value(property_value)?,
        };
        Ok(())
    }

    fn resolve(&mut self) -> Result<Self::ConfigType, ConfigError> {
        trace!("ZookeeperConfigProperties::resolve()");
        let connection_id = self.connection_id.build()?;
        let zk_connect = self.zk_connect.build()?;
        let params = ConnectionParams::builder(&connection_id, &zk_connect)
            .with_session_timeout_ms(self.zk_session_timeout_ms.build()?)
            .with_connection_timeout_ms(self.zk_connection_timeout_ms.build()?)
            .with_retry_interval_ms(self.zk_retry_interval_ms.build()?)
            .with_max_retries(self.zk_max_retries.build()?)
            .with_credentials(self.zk_acl.build()?.0)
            .build()?;
        Ok(params)
    }

    fn validate_values(&self, cfg: &Self::ConfigType) -> Result<(), ConfigError> {
        if cfg.connection_timeout() > cfg.session_timeout() {
            warn!(
                "{} ({:?}) is larger than {} ({:?}), the session timeout wins",
                ZK_CONNECTION_TIMEOUT_PROP,
                cfg.connection_timeout(),
                ZK_SESSION_TIMEOUT_PROP,
                cfg.session_timeout()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zookeeper::ConnectionError;
    use std::collections::HashMap;
    use std::time::Duration;

    fn properties(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }

    #[test_log::test]
    fn it_resolves_connection_params() {
        let mut conf_props = ZookeeperConfigProperties::from_properties_hashmap(properties(&[
            (CONNECTION_ID_PROP, "prod"),
            (ZK_CONNECT_PROP, "zk1:2181,zk2:2181/app"),
            (ZK_SESSION_TIMEOUT_PROP, "30000"),
            (ZK_CONNECTION_TIMEOUT_PROP, "5000"),
            (ZK_RETRY_INTERVAL_PROP, "200"),
            (ZK_MAX_RETRIES_PROP, "5"),
            (ZK_ACL_PROP, "digest:user:pass, ,digest:admin:secret"),
        ]))
        .unwrap();
        let params = conf_props.build().unwrap();
        assert_eq!(params.id(), "prod");
        assert_eq!(params.addresses(), "zk1:2181,zk2:2181/app");
        assert_eq!(params.session_timeout(), Duration::from_secs(30));
        assert_eq!(params.connection_timeout(), Duration::from_secs(5));
        assert_eq!(params.retry_interval(), Duration::from_millis(200));
        assert_eq!(params.max_retries(), 5);
        assert_eq!(params.credentials(), &[
            String::from("digest:user:pass"),
            String::from("digest:admin:secret")
        ]);
    }

    #[test_log::test]
    fn it_uses_defaults() {
        let mut conf_props = ZookeeperConfigProperties::default();
        assert_eq!(
            conf_props.build().unwrap_err(),
            ConfigError::MissingKey(ZK_CONNECT_PROP.to_string())
        );
        conf_props.try_set_property(ZK_CONNECT_PROP, "127.0.0.1:2181").unwrap();
        let params = conf_props.build().unwrap();
        assert!(uuid::Uuid::parse_str(params.id()).is_ok());
        assert_eq!(
            params,
            ConnectionParams::builder(params.id(), "127.0.0.1:2181").build().unwrap()
        );
        // Building again keeps the generated id.
        assert_eq!(conf_props.build().unwrap().id(), params.id());
    }

    #[test_log::test]
    fn it_rejects_bad_properties() {
        assert_eq!(
            ZookeeperConfigProperties::from_properties_hashmap(properties(&[(
                "not.a.known.key",
                "x"
            )]))
            .unwrap_err(),
            ConfigError::UnknownKey(String::from("not.a.known.key"))
        );
        let mut conf_props = ZookeeperConfigProperties::from_properties_hashmap(properties(&[
            (ZK_CONNECT_PROP, "127.0.0.1:2181"),
            (ZK_SESSION_TIMEOUT_PROP, "0"),
        ]))
        .unwrap();
        assert_eq!(
            conf_props.build().unwrap_err(),
            ConfigError::InvalidValue(format!("{}: '0' should be at least 1", ZK_SESSION_TIMEOUT_PROP))
        );
        let mut conf_props = ZookeeperConfigProperties::default();
        conf_props.try_set_property(ZK_CONNECT_PROP, "127.0.0.1:2181").unwrap();
        conf_props.try_set_property(ZK_ACL_PROP, "malformed").unwrap();
        assert!(matches!(
            conf_props.build(),
            Err(ConfigError::Connection(ConnectionError::InvalidCredentialFormat(_)))
        ));
        assert!(matches!(
            conf_props.try_set_property(ZK_MAX_RETRIES_PROP, "-1"),
            Err(ConfigError::ParseInt(_))
        ));
    }

    #[test_log::test]
    fn it_reads_properties_files() {
        let path = std::env::temp_dir().join(format!("zoolink-{}.properties", uuid::Uuid::new_v4()));
        fs_err::write(
            &path,
            "# local cluster\nconnection.id=local\nzookeeper.connect=localhost:2181\nzookeeper.max.retries=0\n",
        )
        .unwrap();
        let mut conf_props =
            ZookeeperConfigProperties::read_config_file(path.to_str().unwrap()).unwrap();
        fs_err::remove_file(&path).unwrap();
        let params = conf_props.build().unwrap();
        assert_eq!(params.id(), "local");
        assert_eq!(params.addresses(), "localhost:2181");
        assert_eq!(params.max_retries(), 0);
        assert!(matches!(
            ZookeeperConfigProperties::read_config_file("/nonexistent/zoolink.properties"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test_log::test]
    fn it_lists_every_key() {
        let names = ZookeeperConfigProperties::config_names();
        assert_eq!(names.len(), 7);
        for name in &names {
            assert!(ZookeeperConfigKey::from_str(name).is_ok());
        }
        let described = ZookeeperConfigProperties::default().describe();
        assert_eq!(described.len(), names.len());
        assert!(described[1].starts_with("zookeeper.connect (high)"));
    }
}
