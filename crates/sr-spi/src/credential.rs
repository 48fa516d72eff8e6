//! Credentials presented to a realm.

use secrecy::SecretString;
use sr_model::SharedState;

/// Proof of identity accompanying a username.
#[derive(Debug)]
pub enum Evidence {
    /// A clear-text password.
    Password(SecretString),
    /// A pre-computed digest of `username:realm:password`, hex encoded.
    Digest(SecretString),
    /// A client certificate already verified by the transport.
    Certificate {
        /// Subject DN of the certificate.
        subject_dn: String,
    },
    /// A Kerberos ticket already accepted by the transport.
    KerberosTicket {
        /// Client principal of the ticket, e.g. `alice@EXAMPLE.COM`.
        principal: String,
    },
}

impl Evidence {
    /// Short label used in logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Password(_) => "password",
            Self::Digest(_) => "digest",
            Self::Certificate { .. } => "certificate",
            Self::KerberosTicket { .. } => "kerberos-ticket",
        }
    }
}

/// A username with its evidence.
#[derive(Debug)]
pub struct Credentials {
    /// Supplied username.
    pub username: String,
    /// Supplied evidence.
    pub evidence: Evidence,
}

impl Credentials {
    /// Creates username/password credentials.
    #[must_use]
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            evidence: Evidence::Password(SecretString::from(password.into())),
        }
    }

    /// Creates username/digest credentials.
    #[must_use]
    pub fn digest(username: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            evidence: Evidence::Digest(SecretString::from(digest.into())),
        }
    }

    /// Creates credentials from an accepted Kerberos ticket.
    #[must_use]
    pub fn kerberos(principal: impl Into<String>) -> Self {
        let principal = principal.into();
        Self {
            username: principal.clone(),
            evidence: Evidence::KerberosTicket { principal },
        }
    }
}

/// Outcome of a successful credential check.
#[derive(Debug, Default)]
pub struct AuthenticatedIdentity {
    /// Name the user is known by inside the realm.
    pub name: String,
    /// Groups the authentication mechanism itself established.
    pub groups: Vec<String>,
    /// Values handed on to the authorization mechanism.
    pub state: SharedState,
}

impl AuthenticatedIdentity {
    /// Creates an identity with no groups and empty shared state.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
