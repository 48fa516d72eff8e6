//! Mechanism capability contract.
//!
//! Every authentication mechanism (properties file, user store, LDAP bind,
//! Kerberos, login context, plug-in) implements [`AuthenticationProvider`].
//! Every authorization mechanism implements [`SubjectSupplemental`]. A realm
//! combines exactly one of the former with at most one of the latter and is
//! published as a [`SecurityRealm`].

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use sr_core::Result;
use sr_model::{PropertyList, SharedState, Subject};

use crate::credential::{AuthenticatedIdentity, Credentials};

/// Authentication mechanism identity, negotiated with the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuthMechanism {
    /// Username and clear-text password.
    Plain,
    /// Digest of username, realm and password.
    Digest,
    /// Client certificate.
    ClientCert,
    /// Kerberos ticket.
    Kerberos,
    /// Mechanism defined by a plug-in.
    Custom,
}

impl AuthMechanism {
    /// Returns the canonical mechanism name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Digest => "DIGEST",
            Self::ClientCert => "CLIENT_CERT",
            Self::Kerberos => "KERBEROS",
            Self::Custom => "CUSTOM",
        }
    }
}

/// Verifies credentials for one authentication mechanism.
#[async_trait]
pub trait CredentialHandler: Send + Sync {
    /// Checks `credentials` and returns the established identity.
    ///
    /// ## Errors
    ///
    /// Returns [`sr_core::Error::AuthenticationFailed`] when the credentials
    /// are rejected, or a transport error when they could not be checked.
    async fn verify(&self, credentials: &Credentials) -> Result<AuthenticatedIdentity>;
}

/// Capability every authentication mechanism exposes.
pub trait AuthenticationProvider: Send + Sync + Debug {
    /// The mechanism this provider is primarily meant for.
    fn preferred_mechanism(&self) -> AuthMechanism;

    /// Additional mechanisms this provider can also service.
    fn supplemental_mechanisms(&self) -> Vec<AuthMechanism> {
        Vec::new()
    }

    /// Options the provider advertises for `mechanism`.
    ///
    /// Used upstream for capability negotiation, e.g. whether a digest
    /// mechanism can see plain-text passwords.
    fn mechanism_options(&self, _mechanism: AuthMechanism) -> PropertyList {
        PropertyList::new()
    }

    /// Whether setup has completed. A provider that is not ready must make
    /// the realm answer with [`sr_core::Error::NotReady`].
    fn is_ready(&self) -> bool {
        true
    }

    /// Returns the handler that checks credentials.
    ///
    /// The provider may hand out a shared handler or build one per call;
    /// callers must not rely on either.
    ///
    /// ## Errors
    ///
    /// Returns an error if the handler cannot be constructed.
    fn credential_handler(&self) -> Result<Arc<dyn CredentialHandler>>;

    /// Whether the provider services `mechanism`.
    fn supports(&self, mechanism: AuthMechanism) -> bool {
        self.preferred_mechanism() == mechanism || self.supplemental_mechanisms().contains(&mechanism)
    }
}

/// Adds group facts to an authenticated subject.
///
/// Implementations must be idempotent: supplementing the same subject twice
/// with the same inputs leaves it as after the first call.
#[async_trait]
pub trait SubjectSupplemental: Send + Sync + Debug {
    /// Augments `subject`, using `state` left by authentication when present.
    ///
    /// ## Errors
    ///
    /// Returns a transport error if group information could not be loaded.
    async fn supplement(&self, subject: &mut Subject, state: &SharedState) -> Result<()>;
}

/// An assembled realm as seen by consumers of the registry.
#[async_trait]
pub trait SecurityRealm: Send + Sync + Debug {
    /// The realm name.
    fn name(&self) -> &str;

    /// All mechanisms the realm services.
    fn supported_mechanisms(&self) -> Vec<AuthMechanism>;

    /// Options advertised for `mechanism`.
    fn mechanism_options(&self, mechanism: AuthMechanism) -> PropertyList;

    /// Whether the realm can service `mechanism` right now.
    fn is_ready(&self, mechanism: AuthMechanism) -> bool;

    /// Verifies credentials and returns the authenticated, authorized
    /// subject.
    ///
    /// ## Errors
    ///
    /// - [`sr_core::Error::NotReady`] if the mechanism has not finished setup
    /// - [`sr_core::Error::AuthenticationFailed`] if credentials are rejected
    /// - transport errors from directory lookups
    async fn authenticate(&self, credentials: &Credentials) -> Result<Subject>;
}
