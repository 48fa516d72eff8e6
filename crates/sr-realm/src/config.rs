//! Management configuration file.
//!
//! A TOML document declaring the outbound LDAP connections and the realms
//! that use them:
//!
//! ```toml
//! [outbound-connections.corp]
//! url = "ldaps://ldap.example.com:636"
//! bind-dn = "cn=search,dc=example,dc=com"
//! bind-credential = "secret"
//!
//! [[realm]]
//! name = "ManagementRealm"
//! map-groups-to-roles = true
//!
//! [[realm.authentication]]
//! type = "properties"
//! path = "mgmt-users.properties"
//! ```
//!
//! Relative file paths are resolved against the directory of the
//! configuration file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use sr_core::{Error, Result};
use sr_ldap::{ConnectionHandler, LdapConnectionConfig, LdapConnectionPool};

use crate::connections::ConnectionRegistry;
use crate::definition::RealmDefinition;
use crate::protocol::{Change, Operation};

const fn default_max_connections() -> usize {
    10
}

const fn default_connection_timeout() -> u64 {
    5
}

const fn default_operation_timeout() -> u64 {
    30
}

/// An outbound LDAP connection.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutboundConnection {
    /// `ldaps://` or `ldap://` URL.
    pub url: String,
    /// Search account DN.
    #[serde(default)]
    pub bind_dn: Option<String>,
    /// Search account password.
    #[serde(default)]
    pub bind_credential: Option<SecretString>,
    /// Accept `ldap://` URLs.
    #[serde(default)]
    pub allow_insecure: bool,
    /// Concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connect timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
    /// Per-operation timeout in seconds.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
}

impl fmt::Debug for OutboundConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundConnection")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("bind_credential", &self.bind_credential.as_ref().map(|_| "[REDACTED]"))
            .field("allow_insecure", &self.allow_insecure)
            .field("max_connections", &self.max_connections)
            .finish_non_exhaustive()
    }
}

impl OutboundConnection {
    /// Converts to a validated connection configuration.
    ///
    /// ## Errors
    ///
    /// Returns [`Error::ConfigurationInvalid`] if the URL is rejected or the
    /// bind DN and credential are not given together.
    pub fn to_ldap_config(&self, name: &str) -> Result<LdapConnectionConfig> {
        let mut builder = LdapConnectionConfig::builder()
            .url(&self.url)
            .allow_insecure(self.allow_insecure)
            .max_connections(self.max_connections)
            .connection_timeout(Duration::from_secs(self.connection_timeout_secs))
            .operation_timeout(Duration::from_secs(self.operation_timeout_secs));
        match (&self.bind_dn, &self.bind_credential) {
            (Some(dn), Some(credential)) => builder = builder.bind(dn, credential.clone()),
            (None, None) => {}
            _ => {
                return Err(Error::config(format!(
                    "outbound connection '{name}': bind-dn and bind-credential must be set together"
                )))
            }
        }
        builder
            .build()
            .map_err(|e| Error::config(format!("outbound connection '{name}': {e}")))
    }
}

/// The management configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManagementConfig {
    /// Outbound LDAP connections by name.
    #[serde(default)]
    pub outbound_connections: BTreeMap<String, OutboundConnection>,
    /// Realm definitions.
    #[serde(default, rename = "realm")]
    pub realms: Vec<RealmDefinition>,
}

impl ManagementConfig {
    /// Parses a TOML document. Relative paths are left as written.
    ///
    /// ## Errors
    ///
    /// Returns [`Error::ConfigurationInvalid`] if the document does not parse.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("management configuration: {e}")))
    }

    /// Reads and parses `path`, resolving relative paths against its
    /// directory.
    ///
    /// ## Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or
    /// [`Error::ConfigurationInvalid`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading '{}': {e}", path.display())))?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            for realm in &mut config.realms {
                realm.resolve_paths(base);
            }
        }
        tracing::info!(
            path = %path.display(),
            realms = config.realms.len(),
            connections = config.outbound_connections.len(),
            "loaded management configuration"
        );
        Ok(config)
    }

    /// Creates a pool for every outbound connection and registers it.
    ///
    /// Nothing is registered if any connection is invalid.
    ///
    /// ## Errors
    ///
    /// Returns [`Error::ConfigurationInvalid`] for the first invalid
    /// connection.
    pub fn register_connections(&self, registry: &ConnectionRegistry) -> Result<()> {
        let mut pools = Vec::with_capacity(self.outbound_connections.len());
        for (name, connection) in &self.outbound_connections {
            let pool = LdapConnectionPool::new(connection.to_ldap_config(name)?)
                .map_err(|e| Error::config(format!("outbound connection '{name}': {e}")))?;
            let handler: Arc<dyn ConnectionHandler> = Arc::new(pool);
            pools.push((name.clone(), handler));
        }
        for (name, handler) in pools {
            registry.register(name, handler);
        }
        Ok(())
    }

    /// The booting change adding every realm.
    #[must_use]
    pub fn into_change(self) -> Change {
        self.realms
            .into_iter()
            .fold(Change::booting(), |change, realm| change.with(Operation::AddRealm(realm)))
    }
}
