//! LDAP configuration.
//!
//! Two kinds of settings live here:
//!
//! - [`LdapConnectionConfig`] for the `ldap3` connection adapter. Only
//!   `ldaps://` URLs are accepted unless insecure connections are explicitly
//!   allowed.
//! - [`UserSearchConfig`] and [`GroupSearchConfig`], the serializable
//!   definitions the search engine is built from.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{LdapError, LdapResult};
use crate::group::{GroupResolver, GroupToPrincipalSearcher, PrincipalToGroupSearcher};
use crate::search::{DnUserSearcher, FilterUserSearcher, UserSearcher};

// ============================================================================
// Search scope
// ============================================================================

/// LDAP search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchScope {
    /// Search only the base DN.
    Base,
    /// Search one level below the base DN.
    #[default]
    OneLevel,
    /// Search the entire subtree.
    Subtree,
}

impl SearchScope {
    /// Scope for a search that optionally descends into subordinate contexts.
    #[must_use]
    pub const fn from_recursive(recursive: bool) -> Self {
        if recursive {
            Self::Subtree
        } else {
            Self::OneLevel
        }
    }

    /// Converts to ldap3 scope.
    #[must_use]
    pub const fn to_ldap3(self) -> ldap3::Scope {
        match self {
            Self::Base => ldap3::Scope::Base,
            Self::OneLevel => ldap3::Scope::OneLevel,
            Self::Subtree => ldap3::Scope::Subtree,
        }
    }
}

// ============================================================================
// Group naming
// ============================================================================

/// How a group (or, for group-to-principal searches, the user) is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupName {
    /// The value of the configured name attribute, e.g. `admins`.
    #[default]
    Simple,
    /// The full distinguished name.
    Distinguished,
}

// ============================================================================
// User search definitions
// ============================================================================

fn default_username_attribute() -> String {
    "uid".to_string()
}

fn default_group_attribute() -> String {
    "memberOf".to_string()
}

fn default_principal_attribute() -> String {
    "member".to_string()
}

fn default_search_by() -> GroupName {
    GroupName::Distinguished
}

/// How a supplied username is resolved to a directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum UserSearchConfig {
    /// The supplied name is already a DN.
    UsernameIsDn {
        /// Read the entry to confirm it exists.
        #[serde(default)]
        force: bool,
    },
    /// Fixed filter `(attribute=name)` under `base_dn`.
    UsernameFilter {
        /// Search base.
        base_dn: String,
        /// Descend into subordinate contexts.
        #[serde(default)]
        recursive: bool,
        /// Attribute compared with the supplied name.
        #[serde(default = "default_username_attribute")]
        attribute: String,
        /// Attribute holding the DN to use instead of the entry DN.
        #[serde(default)]
        user_dn_attribute: Option<String>,
        /// Search again during authorization even if authentication already
        /// resolved the entry.
        #[serde(default)]
        force: bool,
    },
    /// Filter template with `{0}` replaced by the supplied name.
    AdvancedFilter {
        /// Search base.
        base_dn: String,
        /// Descend into subordinate contexts.
        #[serde(default)]
        recursive: bool,
        /// Filter template, e.g. `(&(objectClass=person)(mail={0}))`.
        filter: String,
        /// Attribute holding the simple name of the matched entry.
        #[serde(default)]
        username_attribute: Option<String>,
        /// Attribute holding the DN to use instead of the entry DN.
        #[serde(default)]
        user_dn_attribute: Option<String>,
        /// Search again during authorization even if authentication already
        /// resolved the entry.
        #[serde(default)]
        force: bool,
    },
}

impl UserSearchConfig {
    /// Whether authorization must search again instead of reusing the entry
    /// found during authentication.
    ///
    /// For [`UserSearchConfig::UsernameIsDn`] the flag means "verify the DN
    /// exists" and never disables reuse.
    #[must_use]
    pub const fn force_search(&self) -> bool {
        match self {
            Self::UsernameIsDn { .. } => false,
            Self::UsernameFilter { force, .. } | Self::AdvancedFilter { force, .. } => *force,
        }
    }

    /// Builds the searcher.
    ///
    /// ## Errors
    ///
    /// Returns [`LdapError::Configuration`] if a filter or base DN is
    /// malformed.
    pub fn build(&self) -> LdapResult<Arc<dyn UserSearcher>> {
        let searcher: Arc<dyn UserSearcher> = match self {
            Self::UsernameIsDn { force } => Arc::new(DnUserSearcher::new(*force)),
            Self::UsernameFilter {
                base_dn,
                recursive,
                attribute,
                user_dn_attribute,
                ..
            } => Arc::new(
                FilterUserSearcher::simple(base_dn, *recursive, attribute)?
                    .with_user_dn_attribute(user_dn_attribute.clone()),
            ),
            Self::AdvancedFilter {
                base_dn,
                recursive,
                filter,
                username_attribute,
                user_dn_attribute,
                ..
            } => Arc::new(
                FilterUserSearcher::advanced(base_dn, *recursive, filter, username_attribute.clone())?
                    .with_user_dn_attribute(user_dn_attribute.clone()),
            ),
        };
        Ok(searcher)
    }
}

// ============================================================================
// Group search definitions
// ============================================================================

/// How the groups of a resolved entry are found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum GroupSearchConfig {
    /// Group DNs are listed on the entry itself.
    PrincipalToGroup {
        /// Multi-valued attribute listing group DNs.
        #[serde(default = "default_group_attribute")]
        group_attribute: String,
        /// How groups are named on the subject.
        #[serde(default)]
        group_name: GroupName,
        /// Attribute holding a group's simple name.
        #[serde(default = "default_username_attribute")]
        group_name_attribute: String,
        /// Follow groups of groups.
        #[serde(default)]
        iterative: bool,
        /// Ignore referenced groups that do not exist.
        #[serde(default)]
        skip_missing_groups: bool,
    },
    /// Groups are found by searching for entries that reference the user.
    GroupToPrincipal {
        /// Search base for groups.
        base_dn: String,
        /// Descend into subordinate contexts.
        #[serde(default)]
        recursive: bool,
        /// Membership attribute on group entries.
        #[serde(default = "default_principal_attribute")]
        principal_attribute: String,
        /// Whether members are referenced by DN or by simple name.
        #[serde(default = "default_search_by")]
        search_by: GroupName,
        /// How groups are named on the subject.
        #[serde(default)]
        group_name: GroupName,
        /// Attribute holding a group's simple name.
        #[serde(default = "default_username_attribute")]
        group_name_attribute: String,
        /// Follow groups of groups.
        #[serde(default)]
        iterative: bool,
    },
}

impl GroupSearchConfig {
    /// How groups are named on the subject.
    #[must_use]
    pub const fn group_name(&self) -> GroupName {
        match self {
            Self::PrincipalToGroup { group_name, .. } | Self::GroupToPrincipal { group_name, .. } => {
                *group_name
            }
        }
    }

    /// Builds the resolver.
    ///
    /// ## Errors
    ///
    /// Returns [`LdapError::Configuration`] if an attribute or base DN is
    /// empty.
    pub fn build(&self) -> LdapResult<GroupResolver> {
        match self {
            Self::PrincipalToGroup {
                group_attribute,
                group_name,
                group_name_attribute,
                iterative,
                skip_missing_groups,
            } => {
                let searcher = PrincipalToGroupSearcher::new(group_attribute, group_name_attribute)?
                    .resolve_names(*group_name == GroupName::Simple)
                    .skip_missing_groups(*skip_missing_groups);
                Ok(GroupResolver::new(Arc::new(searcher), *iterative))
            }
            Self::GroupToPrincipal {
                base_dn,
                recursive,
                principal_attribute,
                search_by,
                group_name_attribute,
                iterative,
                ..
            } => {
                let searcher = GroupToPrincipalSearcher::new(
                    base_dn,
                    *recursive,
                    principal_attribute,
                    group_name_attribute,
                )?
                .search_by(*search_by);
                Ok(GroupResolver::new(Arc::new(searcher), *iterative))
            }
        }
    }
}

// ============================================================================
// Connection configuration
// ============================================================================

/// Settings for the `ldap3` connection adapter.
#[derive(Clone)]
pub struct LdapConnectionConfig {
    /// Server URL.
    pub url: String,

    /// Bind DN for the search account. Anonymous when absent.
    pub bind_dn: Option<String>,

    /// Bind credential. Exposed only to the bind request.
    pub bind_credential: Option<SecretString>,

    /// Accept `ldap://` URLs.
    pub allow_insecure: bool,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Connection timeout.
    pub connection_timeout: Duration,

    /// Timeout applied to every search and bind.
    pub operation_timeout: Duration,
}

impl LdapConnectionConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> LdapConnectionConfigBuilder {
        LdapConnectionConfigBuilder::new()
    }

    /// Validates the configuration.
    ///
    /// ## Errors
    ///
    /// - [`LdapError::InsecureProtocol`] for `ldap://` without `allow_insecure`
    /// - [`LdapError::Configuration`] for other malformed settings
    pub fn validate(&self) -> LdapResult<()> {
        let url = self.url.to_lowercase();
        let host = if let Some(rest) = url.strip_prefix("ldaps://") {
            rest
        } else if let Some(rest) = url.strip_prefix("ldap://") {
            if !self.allow_insecure {
                return Err(LdapError::InsecureProtocol);
            }
            rest
        } else {
            return Err(LdapError::config(format!(
                "unsupported URL scheme in '{}'",
                self.url
            )));
        };

        if host.is_empty() {
            return Err(LdapError::config("URL is missing a host"));
        }

        if self.bind_dn.is_some() != self.bind_credential.is_some() {
            return Err(LdapError::config(
                "bind_dn and bind_credential must be set together",
            ));
        }

        if self.max_connections == 0 {
            return Err(LdapError::config("max_connections must be at least 1"));
        }

        Ok(())
    }
}

impl fmt::Debug for LdapConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapConnectionConfig")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("bind_credential", &self.bind_credential.as_ref().map(|_| "***"))
            .field("allow_insecure", &self.allow_insecure)
            .field("max_connections", &self.max_connections)
            .field("connection_timeout", &self.connection_timeout)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

/// Builder for [`LdapConnectionConfig`].
#[derive(Default)]
pub struct LdapConnectionConfigBuilder {
    url: Option<String>,
    bind_dn: Option<String>,
    bind_credential: Option<SecretString>,
    allow_insecure: bool,
    max_connections: usize,
    connection_timeout: Duration,
    operation_timeout: Duration,
}

impl LdapConnectionConfigBuilder {
    /// Creates a new builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_connections: 10,
            connection_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(30),
            ..Default::default()
        }
    }

    /// Sets the server URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the search account credentials.
    #[must_use]
    pub fn bind(mut self, dn: impl Into<String>, credential: impl Into<SecretString>) -> Self {
        self.bind_dn = Some(dn.into());
        self.bind_credential = Some(credential.into());
        self
    }

    /// Accepts `ldap://` URLs.
    #[must_use]
    pub const fn allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    /// Sets the maximum number of concurrent connections.
    #[must_use]
    pub const fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the per-operation timeout.
    #[must_use]
    pub const fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error if the URL is missing or invalid.
    pub fn build(self) -> LdapResult<LdapConnectionConfig> {
        let config = LdapConnectionConfig {
            url: self.url.ok_or_else(|| LdapError::config("url is required"))?,
            bind_dn: self.bind_dn,
            bind_credential: self.bind_credential,
            allow_insecure: self.allow_insecure,
            max_connections: self.max_connections,
            connection_timeout: self.connection_timeout,
            operation_timeout: self.operation_timeout,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Escapes special characters in LDAP filter values (RFC 4515).
#[must_use]
pub fn ldap_escape(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\5c"),
            '*' => result.push_str("\\2a"),
            '(' => result.push_str("\\28"),
            ')' => result.push_str("\\29"),
            '\0' => result.push_str("\\00"),
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_plain_ldap_by_default() {
        let err = LdapConnectionConfig::builder()
            .url("ldap://ldap.example.com:389")
            .build()
            .unwrap_err();
        assert!(matches!(err, LdapError::InsecureProtocol));
    }

    #[test]
    fn plain_ldap_allowed_explicitly() {
        let config = LdapConnectionConfig::builder()
            .url("ldap://ldap.example.com:389")
            .allow_insecure(true)
            .build()
            .unwrap();
        assert!(config.allow_insecure);
    }

    #[test]
    fn rejects_unknown_scheme_and_missing_host() {
        assert!(matches!(
            LdapConnectionConfig::builder().url("http://x").build(),
            Err(LdapError::Configuration(_))
        ));
        assert!(matches!(
            LdapConnectionConfig::builder().url("ldaps://").build(),
            Err(LdapError::Configuration(_))
        ));
    }

    #[test]
    fn accepts_ldaps_with_bind() {
        let config = LdapConnectionConfig::builder()
            .url("ldaps://ldap.example.com:636")
            .bind("cn=admin,dc=example,dc=com", "secret")
            .max_connections(2)
            .build()
            .unwrap();
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.bind_dn.as_deref(), Some("cn=admin,dc=example,dc=com"));
    }

    #[test]
    fn debug_redacts_bind_credential() {
        let config = LdapConnectionConfig::builder()
            .url("ldaps://ldap.example.com")
            .bind("cn=admin", "hunter2")
            .build()
            .unwrap();
        let rendered = format!("{config:?}");
        assert!(rendered.contains("cn=admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn ldap_escape_special_chars() {
        assert_eq!(ldap_escape("john*"), "john\\2a");
        assert_eq!(ldap_escape("(admin)"), "\\28admin\\29");
        assert_eq!(ldap_escape("user\\name"), "user\\5cname");
        assert_eq!(ldap_escape("normal"), "normal");
    }

    #[test]
    fn search_definitions_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            user: UserSearchConfig,
            group: GroupSearchConfig,
        }

        let doc: Doc = toml::from_str(
            r#"
            [user]
            type = "advanced-filter"
            base-dn = "ou=people,dc=example,dc=com"
            recursive = true
            filter = "(&(objectClass=person)(mail={0}))"
            username-attribute = "uid"

            [group]
            type = "group-to-principal"
            base-dn = "ou=groups,dc=example,dc=com"
            iterative = true
            "#,
        )
        .unwrap();

        assert!(matches!(doc.user, UserSearchConfig::AdvancedFilter { recursive: true, .. }));
        match doc.group {
            GroupSearchConfig::GroupToPrincipal {
                principal_attribute,
                search_by,
                iterative,
                ..
            } => {
                assert_eq!(principal_attribute, "member");
                assert_eq!(search_by, GroupName::Distinguished);
                assert!(iterative);
            }
            other => panic!("unexpected group search: {other:?}"),
        }
    }
}
