//! # sr-ldap
//!
//! LDAP search engine and LDAP mechanisms for management security realms.
//!
//! ## Components
//!
//! - [`UserSearcher`] - resolves a supplied username to exactly one entry
//! - [`GroupSearcher`] and [`GroupResolver`] - direct and transitive group
//!   membership
//! - [`ConnectionHandler`] / [`DirectoryConnection`] - the directory contract,
//!   implemented over `ldap3` by [`LdapConnectionPool`] and in memory by
//!   [`memory::MemoryDirectory`]
//! - [`LdapAuthenticationProvider`] and [`LdapSubjectSupplemental`] - the
//!   mechanisms a realm mounts
//!
//! ## Security
//!
//! The `ldap3` adapter only accepts `ldaps://` unless plain LDAP is
//! explicitly allowed. Supplied names are escaped before they are placed in
//! a filter.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod connection;
pub mod entry;
pub mod error;
pub mod group;
pub mod memory;
pub mod provider;
pub mod search;

pub use config::{
    ldap_escape, GroupName, GroupSearchConfig, LdapConnectionConfig, LdapConnectionConfigBuilder,
    SearchScope, UserSearchConfig,
};
pub use connection::{ConnectionHandler, DirectoryConnection, LdapConnection, LdapConnectionPool};
pub use entry::LdapEntry;
pub use error::{LdapError, LdapResult};
pub use group::{GroupResolver, GroupSearcher, GroupToPrincipalSearcher, PrincipalToGroupSearcher};
pub use provider::{LdapAuthenticationProvider, LdapSubjectSupplemental, LDAP_ENTRY_KEY};
pub use search::{DnUserSearcher, FilterTemplate, FilterUserSearcher, UserSearcher};
