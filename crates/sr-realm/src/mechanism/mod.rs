//! Built-in mechanisms.
//!
//! LDAP mechanisms live in `sr-ldap`; plug-in mechanisms come from the
//! [`sr_spi::PluginRegistry`].

pub mod jaas;
pub mod kerberos;
pub mod properties;
pub mod users;

pub use jaas::{JaasAuthentication, LoginContext, LoginContextRegistry};
pub use kerberos::KerberosAuthentication;
pub use properties::{password_digest, PropertiesAuthentication, PropertiesAuthorization};
pub use users::UsersAuthentication;
