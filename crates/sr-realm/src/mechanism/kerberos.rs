//! Kerberos authentication.
//!
//! Ticket validation belongs to the transport; this mechanism maps the
//! client principal of an accepted ticket to a realm user. It is only ready
//! once the realm's server identity has at least one keytab.

use std::sync::Arc;

use async_trait::async_trait;
use sr_core::{Error, Result};
use sr_spi::{
    AuthMechanism, AuthenticatedIdentity, AuthenticationProvider, CredentialHandler, Credentials,
    Evidence,
};

/// Authentication by Kerberos ticket.
#[derive(Debug)]
pub struct KerberosAuthentication {
    keytabs: usize,
    handler: Arc<TicketHandler>,
}

impl KerberosAuthentication {
    /// Creates the mechanism. `keytabs` is the number of keytabs of the
    /// realm's server identity.
    #[must_use]
    pub fn new(keytabs: usize, remove_realm: bool) -> Self {
        Self {
            keytabs,
            handler: Arc::new(TicketHandler { remove_realm }),
        }
    }
}

impl AuthenticationProvider for KerberosAuthentication {
    fn preferred_mechanism(&self) -> AuthMechanism {
        AuthMechanism::Kerberos
    }

    fn is_ready(&self) -> bool {
        self.keytabs > 0
    }

    fn credential_handler(&self) -> Result<Arc<dyn CredentialHandler>> {
        if !self.is_ready() {
            return Err(Error::not_ready("Kerberos server identity has no keytab"));
        }
        let handler: Arc<dyn CredentialHandler> = self.handler.clone();
        Ok(handler)
    }
}

#[derive(Debug)]
struct TicketHandler {
    remove_realm: bool,
}

#[async_trait]
impl CredentialHandler for TicketHandler {
    async fn verify(&self, credentials: &Credentials) -> Result<AuthenticatedIdentity> {
        let Evidence::KerberosTicket { principal } = &credentials.evidence else {
            return Err(Error::AuthenticationFailed);
        };
        let name = match principal.rsplit_once('@') {
            Some((name, _)) if self.remove_realm => name,
            _ => principal.as_str(),
        };
        if name.is_empty() {
            return Err(Error::AuthenticationFailed);
        }
        Ok(AuthenticatedIdentity::new(name))
    }
}
