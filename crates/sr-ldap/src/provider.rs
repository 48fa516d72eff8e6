//! LDAP mechanisms.
//!
//! [`LdapAuthenticationProvider`] verifies a username and password by
//! resolving the user entry and binding as it. [`LdapSubjectSupplemental`]
//! adds the user's directory groups to the subject. When both run in the same
//! realm the entry found during authentication is handed over through
//! [`SharedState`] under [`LDAP_ENTRY_KEY`] so the user is not searched for
//! twice.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sr_core::{Error, Result};
use sr_model::{PrincipalKind, RealmPrincipal, SharedState, Subject};
use sr_spi::{
    AuthMechanism, AuthenticatedIdentity, AuthenticationProvider, CredentialHandler, Credentials,
    Evidence, SubjectSupplemental,
};

use crate::config::GroupName;
use crate::connection::ConnectionHandler;
use crate::entry::LdapEntry;
use crate::error::LdapError;
use crate::group::GroupResolver;
use crate::search::UserSearcher;

/// Shared-state key under which the resolved user entry is stored.
pub const LDAP_ENTRY_KEY: &str = "ldap-entry";

/// Plain-password authentication against a directory.
#[derive(Debug)]
pub struct LdapAuthenticationProvider {
    handler: Arc<LdapCredentialHandler>,
}

impl LdapAuthenticationProvider {
    /// Creates the provider.
    #[must_use]
    pub fn new(connection: Arc<dyn ConnectionHandler>, user_searcher: Arc<dyn UserSearcher>) -> Self {
        Self {
            handler: Arc::new(LdapCredentialHandler {
                connection,
                user_searcher,
                allow_empty_passwords: false,
            }),
        }
    }

    /// Accepts empty passwords. Many directories treat an empty password as
    /// an anonymous bind, so this is off by default.
    #[must_use]
    pub fn allow_empty_passwords(self, allow: bool) -> Self {
        Self {
            handler: Arc::new(LdapCredentialHandler {
                connection: Arc::clone(&self.handler.connection),
                user_searcher: Arc::clone(&self.handler.user_searcher),
                allow_empty_passwords: allow,
            }),
        }
    }
}

impl AuthenticationProvider for LdapAuthenticationProvider {
    fn preferred_mechanism(&self) -> AuthMechanism {
        AuthMechanism::Plain
    }

    fn credential_handler(&self) -> Result<Arc<dyn CredentialHandler>> {
        let handler: Arc<dyn CredentialHandler> = self.handler.clone();
        Ok(handler)
    }
}

#[derive(Debug)]
struct LdapCredentialHandler {
    connection: Arc<dyn ConnectionHandler>,
    user_searcher: Arc<dyn UserSearcher>,
    allow_empty_passwords: bool,
}

#[async_trait]
impl CredentialHandler for LdapCredentialHandler {
    async fn verify(&self, credentials: &Credentials) -> Result<AuthenticatedIdentity> {
        let Evidence::Password(password) = &credentials.evidence else {
            tracing::debug!(evidence = credentials.evidence.label(), "LDAP only accepts passwords");
            return Err(Error::AuthenticationFailed);
        };
        if password.expose_secret().is_empty() && !self.allow_empty_passwords {
            tracing::debug!(user = %credentials.username, "empty password rejected");
            return Err(Error::AuthenticationFailed);
        }

        let entry = {
            let mut conn = self.connection.connect().await?;
            match self
                .user_searcher
                .user_search(&mut *conn, &credentials.username)
                .await
            {
                Ok(entry) => entry,
                Err(LdapError::NotFound(_)) => {
                    tracing::debug!(user = %credentials.username, "no directory entry for user");
                    return Err(Error::AuthenticationFailed);
                }
                Err(e) => return Err(e.into()),
            }
        };

        if !self.connection.verify_password(&entry.dn, password).await? {
            tracing::debug!(dn = %entry.dn, "directory rejected bind");
            return Err(Error::AuthenticationFailed);
        }

        let mut identity = AuthenticatedIdentity::new(
            entry
                .simple_name
                .clone()
                .unwrap_or_else(|| credentials.username.clone()),
        );
        identity.state.insert(LDAP_ENTRY_KEY, entry);
        Ok(identity)
    }
}

/// Adds directory groups to an authenticated subject.
pub struct LdapSubjectSupplemental {
    connection: Arc<dyn ConnectionHandler>,
    user_searcher: Option<Arc<dyn UserSearcher>>,
    force: bool,
    resolver: GroupResolver,
    group_name: GroupName,
}

impl LdapSubjectSupplemental {
    /// Creates the supplemental.
    ///
    /// Without `user_searcher` the entry must have been left in the shared
    /// state by LDAP authentication.
    #[must_use]
    pub fn new(
        connection: Arc<dyn ConnectionHandler>,
        user_searcher: Option<Arc<dyn UserSearcher>>,
        resolver: GroupResolver,
        group_name: GroupName,
    ) -> Self {
        Self {
            connection,
            user_searcher,
            force: false,
            resolver,
            group_name,
        }
    }

    /// Searches for the user even when authentication already resolved it.
    #[must_use]
    pub const fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    fn group_principal(&self, user: &RealmPrincipal, group: &LdapEntry) -> Result<RealmPrincipal> {
        let name = match self.group_name {
            GroupName::Simple => group.display_name(),
            GroupName::Distinguished => group.dn.as_str(),
        };
        let principal = match user.realm() {
            Some(realm) => RealmPrincipal::with_realm(PrincipalKind::Group, realm, name)?,
            None => RealmPrincipal::new(PrincipalKind::Group, name)?,
        };
        Ok(principal)
    }
}

impl fmt::Debug for LdapSubjectSupplemental {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapSubjectSupplemental")
            .field("connection", &self.connection)
            .field("user_search", &self.user_searcher.is_some())
            .field("force", &self.force)
            .field("group_name", &self.group_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SubjectSupplemental for LdapSubjectSupplemental {
    async fn supplement(&self, subject: &mut Subject, state: &SharedState) -> Result<()> {
        let Some(user) = subject.user().cloned() else {
            return Ok(());
        };

        let mut conn = self.connection.connect().await?;
        let shared = state.get::<LdapEntry>(LDAP_ENTRY_KEY);
        let entry = match (shared, &self.user_searcher) {
            (Some(entry), Some(searcher)) if self.force => {
                tracing::debug!(dn = %entry.dn, "forced search ignores shared entry");
                searcher.user_search(&mut *conn, user.name()).await?
            }
            (Some(entry), _) => entry.clone(),
            (None, Some(searcher)) => searcher.user_search(&mut *conn, user.name()).await?,
            (None, None) => {
                return Err(Error::config(
                    "LDAP authorization has no user search and authentication left no entry",
                ))
            }
        };

        let groups = self.resolver.resolve(&mut *conn, &entry).await?;
        for group in &groups {
            subject.add(self.group_principal(&user, group)?);
        }
        Ok(())
    }
}
