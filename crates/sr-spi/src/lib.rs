//! # sr-spi
//!
//! Service provider interface for management security realms.
//!
//! ## Design
//!
//! Mechanisms are trait objects selected at configuration time:
//! - [`AuthenticationProvider`] - one per realm, verifies credentials through
//!   a [`CredentialHandler`]
//! - [`SubjectSupplemental`] - at most one per realm, adds groups after
//!   authentication
//! - [`SecurityRealm`] - the assembled capability consumers look up in the
//!   [`RealmRegistry`]
//! - [`PluginRegistry`] - named factories standing in for dynamically loaded
//!   extensions

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod credential;
pub mod mechanism;
pub mod plugin;
pub mod registry;

pub use credential::{AuthenticatedIdentity, Credentials, Evidence};
pub use mechanism::{
    AuthMechanism, AuthenticationProvider, CredentialHandler, SecurityRealm, SubjectSupplemental,
};
pub use plugin::{PluginFactory, PluginInstance, PluginRegistry};
pub use registry::{DenyAll, LookupGuard, PermitAll, RealmRegistrar, RealmRegistry};
