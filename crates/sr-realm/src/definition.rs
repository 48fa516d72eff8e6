//! Realm definitions.
//!
//! The serializable description of a realm: its plug-in modules, its
//! mechanisms and its Kerberos server identity. Definitions are plain data;
//! [`crate::protocol::MechanismProtocol`] validates them and
//! [`crate::realm::BuildContext`] turns them into running realms.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sr_ldap::{GroupSearchConfig, UserSearchConfig};
use sr_model::PropertyList;

// ============================================================================
// Mechanism kinds
// ============================================================================

/// The kind of a mechanism. A realm holds at most one mechanism of each kind
/// per mount point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MechanismKind {
    /// Properties file.
    Properties,
    /// Inline user store.
    Users,
    /// LDAP directory.
    Ldap,
    /// Kerberos ticket.
    Kerberos,
    /// Host-supplied login context.
    Jaas,
    /// Externally supplied plug-in.
    Plugin,
}

impl MechanismKind {
    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Properties => "properties",
            Self::Users => "users",
            Self::Ldap => "ldap",
            Self::Kerberos => "kerberos",
            Self::Jaas => "jaas",
            Self::Plugin => "plugin",
        }
    }
}

impl fmt::Display for MechanismKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// An authentication mechanism definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum AuthenticationDefinition {
    /// `user=value` properties file.
    Properties {
        /// File location.
        path: PathBuf,
        /// Values are clear-text passwords rather than digests.
        #[serde(default)]
        plain_text: bool,
    },
    /// Users listed inline with clear-text passwords.
    Users {
        /// Username to password.
        #[serde(default)]
        users: BTreeMap<String, String>,
    },
    /// Bind against an LDAP directory.
    Ldap {
        /// Name of the outbound connection.
        connection: String,
        /// How the supplied username is resolved.
        user_search: UserSearchConfig,
        /// Accept empty passwords.
        #[serde(default)]
        allow_empty_passwords: bool,
    },
    /// Kerberos tickets accepted by the transport.
    Kerberos {
        /// Strip `@REALM` from the ticket principal.
        #[serde(default)]
        remove_realm: bool,
    },
    /// A login context supplied by the host.
    Jaas {
        /// Login context name.
        name: String,
        /// Add the groups the login context reports.
        #[serde(default)]
        assign_groups: bool,
    },
    /// A plug-in from one of the realm's modules.
    Plugin {
        /// Plug-in name.
        name: String,
        /// Options passed through to the plug-in.
        #[serde(default)]
        properties: PropertyList,
    },
}

impl AuthenticationDefinition {
    /// The mechanism kind.
    #[must_use]
    pub const fn kind(&self) -> MechanismKind {
        match self {
            Self::Properties { .. } => MechanismKind::Properties,
            Self::Users { .. } => MechanismKind::Users,
            Self::Ldap { .. } => MechanismKind::Ldap,
            Self::Kerberos { .. } => MechanismKind::Kerberos,
            Self::Jaas { .. } => MechanismKind::Jaas,
            Self::Plugin { .. } => MechanismKind::Plugin,
        }
    }

    fn resolve_paths(&mut self, base: &Path) {
        if let Self::Properties { path, .. } = self {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

// ============================================================================
// Authorization
// ============================================================================

/// An authorization mechanism definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum AuthorizationDefinition {
    /// `user=group1,group2` properties file.
    Properties {
        /// File location.
        path: PathBuf,
    },
    /// Group search in an LDAP directory.
    Ldap {
        /// Outbound connection. Defaults to the LDAP authentication
        /// connection.
        #[serde(default)]
        connection: Option<String>,
        /// How the username is resolved to an entry when authentication did
        /// not leave one behind.
        #[serde(default)]
        username_to_dn: Option<UserSearchConfig>,
        /// How groups are found.
        group_search: GroupSearchConfig,
    },
    /// A plug-in from one of the realm's modules.
    Plugin {
        /// Plug-in name.
        name: String,
        /// Options passed through to the plug-in.
        #[serde(default)]
        properties: PropertyList,
    },
}

impl AuthorizationDefinition {
    /// The mechanism kind.
    #[must_use]
    pub const fn kind(&self) -> MechanismKind {
        match self {
            Self::Properties { .. } => MechanismKind::Properties,
            Self::Ldap { .. } => MechanismKind::Ldap,
            Self::Plugin { .. } => MechanismKind::Plugin,
        }
    }

    fn resolve_paths(&mut self, base: &Path) {
        if let Self::Properties { path } = self {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

// ============================================================================
// Server identities
// ============================================================================

/// A Kerberos keytab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KeytabDefinition {
    /// Service principal, e.g. `HTTP/host.example.com@EXAMPLE.COM`.
    pub principal: String,
    /// Keytab file.
    pub path: PathBuf,
}

/// The Kerberos identity a realm presents to clients.
///
/// Valid with zero keytabs; the keytab count is only checked once Kerberos
/// authentication is added to the realm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KerberosIdentity {
    /// Configured keytabs.
    #[serde(default)]
    pub keytabs: Vec<KeytabDefinition>,
}

// ============================================================================
// Realm
// ============================================================================

/// A security realm definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RealmDefinition {
    /// Realm name, unique and case-sensitive.
    pub name: String,

    /// Modules plug-in mechanisms are loaded from.
    #[serde(default)]
    pub plugin_modules: Vec<String>,

    /// Add a role principal for every group principal.
    #[serde(default)]
    pub map_groups_to_roles: bool,

    /// Authentication mechanisms. A valid realm has exactly one.
    #[serde(default)]
    pub authentication: Vec<AuthenticationDefinition>,

    /// Authorization mechanisms. A valid realm has at most one.
    #[serde(default)]
    pub authorization: Vec<AuthorizationDefinition>,

    /// Kerberos server identity.
    #[serde(default)]
    pub kerberos: Option<KerberosIdentity>,
}

impl RealmDefinition {
    /// Creates an empty realm definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plugin_modules: Vec::new(),
            map_groups_to_roles: false,
            authentication: Vec::new(),
            authorization: Vec::new(),
            kerberos: None,
        }
    }

    /// Adds an authentication mechanism.
    #[must_use]
    pub fn with_authentication(mut self, mechanism: AuthenticationDefinition) -> Self {
        self.authentication.push(mechanism);
        self
    }

    /// Adds an authorization mechanism.
    #[must_use]
    pub fn with_authorization(mut self, mechanism: AuthorizationDefinition) -> Self {
        self.authorization.push(mechanism);
        self
    }

    /// Declares a plug-in module.
    #[must_use]
    pub fn with_plugin_module(mut self, module: impl Into<String>) -> Self {
        self.plugin_modules.push(module.into());
        self
    }

    /// Sets the Kerberos server identity.
    #[must_use]
    pub fn with_kerberos(mut self, identity: KerberosIdentity) -> Self {
        self.kerberos = Some(identity);
        self
    }

    /// Enables group-to-role mapping.
    #[must_use]
    pub const fn with_map_groups_to_roles(mut self, enabled: bool) -> Self {
        self.map_groups_to_roles = enabled;
        self
    }

    /// The authentication mechanism of `kind`, if configured.
    #[must_use]
    pub fn authentication_of(&self, kind: MechanismKind) -> Option<&AuthenticationDefinition> {
        self.authentication.iter().find(|m| m.kind() == kind)
    }

    /// The authorization mechanism of `kind`, if configured.
    #[must_use]
    pub fn authorization_of(&self, kind: MechanismKind) -> Option<&AuthorizationDefinition> {
        self.authorization.iter().find(|m| m.kind() == kind)
    }

    /// Number of configured keytabs.
    #[must_use]
    pub fn keytab_count(&self) -> usize {
        self.kerberos.as_ref().map_or(0, |k| k.keytabs.len())
    }

    /// Makes relative file paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for mechanism in &mut self.authentication {
            mechanism.resolve_paths(base);
        }
        for mechanism in &mut self.authorization {
            mechanism.resolve_paths(base);
        }
    }
}
