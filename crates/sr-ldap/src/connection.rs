//! Directory connections.
//!
//! Searchers and mechanisms talk to the directory through two traits:
//! [`ConnectionHandler`] hands out connections and checks passwords,
//! [`DirectoryConnection`] runs searches on one connection. The `ldap3`
//! adapter below is the production implementation; tests use
//! [`crate::memory::MemoryDirectory`].
//!
//! ## Security Requirements
//!
//! The adapter connects with LDAPS unless the configuration explicitly
//! allows plain LDAP. STARTTLS is NOT supported to prevent downgrade attacks.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, SearchEntry};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::{LdapConnectionConfig, SearchScope};
use crate::entry::LdapEntry;
use crate::error::{LdapError, LdapResult};

/// LDAP result code for `noSuchObject`.
const RC_NO_SUCH_OBJECT: u32 = 32;

/// LDAP result code for `invalidCredentials`.
const RC_INVALID_CREDENTIALS: u32 = 49;

/// Filter matching every entry.
pub const MATCH_ALL: &str = "(objectClass=*)";

/// One open connection to a directory.
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Runs a search and returns all matching entries.
    ///
    /// A search base that does not exist yields an empty result.
    ///
    /// ## Errors
    ///
    /// Returns a transport error if the search could not be performed.
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&str],
    ) -> LdapResult<Vec<LdapEntry>>;

    /// Reads a single entry by DN.
    ///
    /// ## Errors
    ///
    /// Returns a transport error if the read could not be performed.
    async fn read(&mut self, dn: &str, attributes: &[&str]) -> LdapResult<Option<LdapEntry>> {
        let mut entries = self
            .search(dn, SearchScope::Base, MATCH_ALL, attributes)
            .await?;
        Ok(entries.pop())
    }
}

/// Source of directory connections shared by the mechanisms of a realm.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + fmt::Debug {
    /// Opens (or borrows) a connection bound as the search account.
    ///
    /// ## Errors
    ///
    /// Returns a transport error if no connection could be established.
    async fn connect(&self) -> LdapResult<Box<dyn DirectoryConnection>>;

    /// Checks `password` by binding as `dn` on a dedicated connection.
    ///
    /// Returns `Ok(false)` when the directory rejects the credentials.
    ///
    /// ## Errors
    ///
    /// Returns a transport error if the bind could not be attempted.
    async fn verify_password(&self, dn: &str, password: &SecretString) -> LdapResult<bool>;
}

/// Connection source backed by `ldap3`.
///
/// Concurrency is bounded by a semaphore of `max_connections` permits. Each
/// checkout opens a fresh connection that is unbound when dropped.
pub struct LdapConnectionPool {
    config: Arc<LdapConnectionConfig>,
    semaphore: Arc<Semaphore>,
}

impl LdapConnectionPool {
    /// Creates a new connection pool.
    ///
    /// ## Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(config: LdapConnectionConfig) -> LdapResult<Self> {
        config.validate()?;
        let permits = config.max_connections;
        Ok(Self {
            config: Arc::new(config),
            semaphore: Arc::new(Semaphore::new(permits)),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LdapConnectionConfig {
        &self.config
    }

    async fn open(&self) -> LdapResult<(Ldap, OwnedSemaphorePermit)> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| LdapError::connection("connection pool closed"))?;

        let settings = LdapConnSettings::new().set_conn_timeout(self.config.connection_timeout);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.config.url)
            .await
            .map_err(|e| LdapError::Connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::warn!(error = %e, "LDAP connection driver error");
            }
        });

        Ok((ldap, permit))
    }
}

impl fmt::Debug for LdapConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapConnectionPool")
            .field("url", &self.config.url)
            .field("available", &self.semaphore.available_permits())
            .finish()
    }
}

#[async_trait]
impl ConnectionHandler for LdapConnectionPool {
    async fn connect(&self) -> LdapResult<Box<dyn DirectoryConnection>> {
        let (mut ldap, permit) = self.open().await?;

        if let (Some(dn), Some(credential)) = (&self.config.bind_dn, &self.config.bind_credential) {
            ldap.with_timeout(self.config.operation_timeout)
                .simple_bind(dn, credential.expose_secret())
                .await
                .map_err(|e| LdapError::Bind(e.to_string()))?
                .success()
                .map_err(|e| LdapError::Bind(format!("search account bind failed: {e}")))?;
        }

        Ok(Box::new(LdapConnection {
            ldap,
            config: Arc::clone(&self.config),
            _permit: permit,
        }))
    }

    async fn verify_password(&self, dn: &str, password: &SecretString) -> LdapResult<bool> {
        let (mut ldap, _permit) = self.open().await?;

        let result = ldap
            .with_timeout(self.config.operation_timeout)
            .simple_bind(dn, password.expose_secret())
            .await
            .map_err(|e| LdapError::Bind(e.to_string()))?;

        let verified = match result.rc {
            0 => true,
            RC_INVALID_CREDENTIALS => false,
            rc => {
                return Err(LdapError::Bind(format!(
                    "unexpected result code {rc} binding as '{dn}'"
                )))
            }
        };

        if let Err(e) = ldap.unbind().await {
            tracing::debug!(error = %e, "unbind after password check failed");
        }
        Ok(verified)
    }
}

/// A connection checked out of an [`LdapConnectionPool`].
pub struct LdapConnection {
    ldap: Ldap,
    config: Arc<LdapConnectionConfig>,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl DirectoryConnection for LdapConnection {
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&str],
    ) -> LdapResult<Vec<LdapEntry>> {
        let attrs: Vec<String> = attributes.iter().map(|a| (*a).to_string()).collect();
        let result = self
            .ldap
            .with_timeout(self.config.operation_timeout)
            .search(base_dn, scope.to_ldap3(), filter, attrs)
            .await
            .map_err(|e| LdapError::Search(e.to_string()))?;

        if result.1.rc == RC_NO_SUCH_OBJECT {
            return Ok(Vec::new());
        }

        let (entries, _) = result
            .success()
            .map_err(|e| LdapError::Search(format!("search under '{base_dn}' failed: {e}")))?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(LdapEntry::from_search_entry)
            .collect())
    }
}

impl Drop for LdapConnection {
    fn drop(&mut self) {
        let mut ldap = self.ldap.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = ldap.unbind().await;
            });
        }
    }
}
