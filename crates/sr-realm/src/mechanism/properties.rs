//! Properties-file mechanisms.
//!
//! Authentication reads `user=value` lines where the value is either a
//! clear-text password or `hex(sha256(user:realm:password))`. Authorization
//! reads `user=group1,group2` lines. Blank lines and lines starting with `#`
//! or `!` are ignored.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use sr_core::{Error, Result};
use sr_model::{PrincipalKind, PropertyList, RealmPrincipal, SharedState, Subject};
use sr_spi::{
    AuthMechanism, AuthenticatedIdentity, AuthenticationProvider, CredentialHandler, Credentials,
    Evidence, SubjectSupplemental,
};

/// Option advertised for [`AuthMechanism::Digest`]: whether stored values are
/// clear text.
pub const DIGEST_PLAIN_TEXT: &str = "digest-plain-text";

/// Computes the stored form of a password: `hex(sha256(user:realm:password))`.
#[must_use]
pub fn password_digest(user: &str, realm: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user.as_bytes());
    hasher.update(b":");
    hasher.update(realm.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Parses `key=value` lines.
///
/// ## Errors
///
/// Returns [`Error::Io`] if the file cannot be read and
/// [`Error::ConfigurationInvalid`] for a line without `=`.
pub fn read_properties(path: &Path) -> Result<Vec<(String, String)>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::io(format!("reading '{}': {e}", path.display())))?;
    parse_properties(&content).map_err(|line| {
        Error::config(format!("'{}' line {line}: expected key=value", path.display()))
    })
}

fn parse_properties(content: &str) -> std::result::Result<Vec<(String, String)>, usize> {
    let mut entries = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or(index + 1)?;
        entries.push((key.trim().to_string(), value.trim().to_string()));
    }
    Ok(entries)
}

/// Username to stored password, shared by the file and inline stores.
pub(crate) struct PasswordStore {
    realm: String,
    plain_text: bool,
    users: HashMap<String, SecretString>,
}

impl PasswordStore {
    pub(crate) fn new(
        realm: impl Into<String>,
        plain_text: bool,
        users: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            realm: realm.into(),
            plain_text,
            users: users
                .into_iter()
                .map(|(user, value)| (user, SecretString::from(value)))
                .collect(),
        }
    }

    pub(crate) const fn plain_text(&self) -> bool {
        self.plain_text
    }

    pub(crate) fn len(&self) -> usize {
        self.users.len()
    }

    fn matches(&self, username: &str, evidence: &Evidence) -> bool {
        let Some(stored) = self.users.get(username) else {
            return false;
        };
        let stored = stored.expose_secret();
        match evidence {
            Evidence::Password(password) if self.plain_text => {
                constant_time_eq(stored.as_bytes(), password.expose_secret().as_bytes())
            }
            Evidence::Password(password) => digest_eq(
                &password_digest(username, &self.realm, password.expose_secret()),
                stored,
            ),
            Evidence::Digest(digest) if self.plain_text => digest_eq(
                &password_digest(username, &self.realm, stored),
                digest.expose_secret(),
            ),
            Evidence::Digest(digest) => digest_eq(stored, digest.expose_secret()),
            Evidence::Certificate { .. } | Evidence::KerberosTicket { .. } => false,
        }
    }
}

/// Hex digests compare case-insensitively.
fn digest_eq(a: &str, b: &str) -> bool {
    constant_time_eq(
        a.to_ascii_lowercase().as_bytes(),
        b.to_ascii_lowercase().as_bytes(),
    )
}

/// Constant-time comparison of two byte slices.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

impl fmt::Debug for PasswordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordStore")
            .field("realm", &self.realm)
            .field("plain_text", &self.plain_text)
            .field("users", &self.users.len())
            .finish()
    }
}

#[async_trait]
impl CredentialHandler for PasswordStore {
    async fn verify(&self, credentials: &Credentials) -> Result<AuthenticatedIdentity> {
        if self.matches(&credentials.username, &credentials.evidence) {
            Ok(AuthenticatedIdentity::new(credentials.username.clone()))
        } else {
            tracing::debug!(
                realm = %self.realm,
                evidence = credentials.evidence.label(),
                "password store rejected credentials"
            );
            Err(Error::AuthenticationFailed)
        }
    }
}

/// Authentication against a properties file.
#[derive(Debug)]
pub struct PropertiesAuthentication {
    store: Arc<PasswordStore>,
}

impl PropertiesAuthentication {
    /// Loads `path` for `realm`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path, realm: &str, plain_text: bool) -> Result<Self> {
        let users = read_properties(path)?;
        tracing::debug!(path = %path.display(), users = users.len(), "loaded users");
        Ok(Self::from_entries(realm, plain_text, users))
    }

    /// Builds the mechanism from already parsed entries.
    #[must_use]
    pub fn from_entries(
        realm: &str,
        plain_text: bool,
        users: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            store: Arc::new(PasswordStore::new(realm, plain_text, users)),
        }
    }
}

impl AuthenticationProvider for PropertiesAuthentication {
    fn preferred_mechanism(&self) -> AuthMechanism {
        AuthMechanism::Plain
    }

    fn supplemental_mechanisms(&self) -> Vec<AuthMechanism> {
        vec![AuthMechanism::Digest]
    }

    fn mechanism_options(&self, mechanism: AuthMechanism) -> PropertyList {
        match mechanism {
            AuthMechanism::Digest => {
                PropertyList::new().with(DIGEST_PLAIN_TEXT, self.store.plain_text().to_string())
            }
            _ => PropertyList::new(),
        }
    }

    fn credential_handler(&self) -> Result<Arc<dyn CredentialHandler>> {
        let handler: Arc<dyn CredentialHandler> = self.store.clone();
        Ok(handler)
    }
}

/// Group membership from a properties file.
#[derive(Debug)]
pub struct PropertiesAuthorization {
    groups: HashMap<String, Vec<String>>,
}

impl PropertiesAuthorization {
    /// Loads `path`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from_entries(read_properties(path)?))
    }

    /// Builds the mechanism from `user=group1,group2` entries.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        let groups = entries
            .into_iter()
            .map(|(user, groups)| {
                let groups = groups
                    .split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_string)
                    .collect();
                (user, groups)
            })
            .collect();
        Self { groups }
    }
}

#[async_trait]
impl SubjectSupplemental for PropertiesAuthorization {
    async fn supplement(&self, subject: &mut Subject, _state: &SharedState) -> Result<()> {
        let Some(user) = subject.user().cloned() else {
            return Ok(());
        };
        for group in self.groups.get(user.name()).into_iter().flatten() {
            let principal = match user.realm() {
                Some(realm) => RealmPrincipal::with_realm(PrincipalKind::Group, realm, group)?,
                None => RealmPrincipal::new(PrincipalKind::Group, group.as_str())?,
            };
            subject.add(principal);
        }
        Ok(())
    }
}
