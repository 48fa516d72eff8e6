//! # sr-realm
//!
//! Management security realms.
//!
//! A realm is configured with exactly one authentication mechanism and at
//! most one authorization mechanism. [`MechanismProtocol`] applies
//! configuration changes, validates them, and publishes the resulting
//! [`Realm`]s to the [`sr_spi::RealmRegistry`] in one step, so readers only
//! ever observe realms that passed validation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sr_realm::{BuildContext, ManagementConfig, MechanismProtocol};
//! use sr_spi::RealmRegistry;
//!
//! let config = ManagementConfig::load(path)?;
//! let context = BuildContext::new();
//! config.register_connections(&context.connections)?;
//!
//! let (registry, registrar) = RealmRegistry::channel();
//! let mut protocol = MechanismProtocol::new(registrar, context);
//! protocol.apply(config.into_change())?;
//!
//! let realm = registry.lookup("ManagementRealm")?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod connections;
pub mod definition;
pub mod mechanism;
pub mod model;
pub mod protocol;
pub mod realm;

pub use config::{ManagementConfig, OutboundConnection};
pub use connections::ConnectionRegistry;
pub use definition::{
    AuthenticationDefinition, AuthorizationDefinition, KerberosIdentity, KeytabDefinition,
    MechanismKind, RealmDefinition,
};
pub use mechanism::{LoginContext, LoginContextRegistry};
pub use model::RealmModel;
pub use protocol::{
    Change, ChangeOutcome, MechanismProtocol, Operation, PermitRbac, RbacCheck, Restart,
};
pub use realm::{BuildContext, Realm};
