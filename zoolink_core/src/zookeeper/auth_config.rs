//! Digest style credentials (`scheme:secret`) and the ACLs applied once credentials are in use.

use super::ConnectionError;
use std::fmt;
use zookeeper_async::Acl;

/// A validated `scheme:secret` pair, registered on the session with `add_auth`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    scheme: String,
    secret: String,
}

impl Credential {
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// The bytes handed to the zookeeper `add_auth` call.
    pub fn auth_bytes(&self) -> Vec<u8> {
        self.secret.as_bytes().to_vec()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("scheme", &self.scheme)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Parses raw credential strings.
pub struct AuthConfig;

impl AuthConfig {
    /// `parse` trims every entry, skips the blank ones and splits the rest on the first `:`.
    /// Entries without a separator, or with a blank scheme or secret, are rejected.
    pub fn parse<S: AsRef<str>>(raw_credentials: &[S]) -> Result<Vec<Credential>, ConnectionError> {
        raw_credentials
            .iter()
            .map(|raw| raw.as_ref().trim())
            .filter(|raw| !raw.is_empty())
            .map(Self::parse_one)
            .collect()
    }

    fn parse_one(raw: &str) -> Result<Credential, ConnectionError> {
        match raw.split_once(':') {
            Some((scheme, secret)) if !scheme.trim().is_empty() && !secret.trim().is_empty() => {
                Ok(Credential { scheme: scheme.trim().to_string(), secret: secret.trim().to_string() })
            },
            // The scheme is enough to find the entry again, never echo the secret.
            Some((scheme, _)) => Err(ConnectionError::InvalidCredentialFormat(format!(
                "'{}:' has a blank scheme or secret",
                scheme.trim()
            ))),
            None => Err(ConnectionError::InvalidCredentialFormat(String::from(
                "missing ':' separator between scheme and secret",
            ))),
        }
    }
}

/// Decides the ACLs attached to nodes created through an authenticated connection.
pub trait AclProvider: fmt::Debug + Send + Sync {
    fn default_acl(&self) -> Vec<Acl>;
    fn acl_for_path(&self, path: &str) -> Vec<Acl>;
}

/// Grants every permission to the creator only, on every path.
#[derive(Debug, Default, Clone, Copy)]
pub struct CreatorAllAclProvider;

impl AclProvider for CreatorAllAclProvider {
    fn default_acl(&self) -> Vec<Acl> {
        Acl::creator_all().to_vec()
    }

    fn acl_for_path(&self, _path: &str) -> Vec<Acl> {
        self.default_acl()
    }
}
