//! LDAP-specific error types.
//!
//! ## Security Note
//!
//! Error messages must not leak passwords or bind credentials.

use thiserror::Error;

/// LDAP-specific errors.
#[derive(Debug, Error)]
pub enum LdapError {
    /// Invalid configuration or malformed filter.
    #[error("LDAP configuration error: {0}")]
    Configuration(String),

    /// Plain `ldap://` URL where TLS is required.
    #[error("Security error: URL must start with 'ldaps://' unless insecure connections are explicitly allowed")]
    InsecureProtocol,

    /// Connection failed.
    #[error("LDAP connection failed: {0}")]
    Connection(String),

    /// Bind (authentication) failed for a reason other than bad credentials.
    #[error("LDAP bind failed: {0}")]
    Bind(String),

    /// Search operation failed.
    #[error("LDAP search failed: {0}")]
    Search(String),

    /// No entry matched.
    #[error("No LDAP entry found for '{0}'")]
    NotFound(String),

    /// More than one entry matched where one was required.
    #[error("{count} LDAP entries matched '{name}', expected exactly one")]
    Ambiguous {
        /// Supplied name.
        name: String,
        /// Number of matches.
        count: usize,
    },

    /// An entry lacks the attribute that should carry its DN.
    #[error("Invalid DN: {0}")]
    InvalidDn(String),

    /// Timeout error.
    #[error("LDAP operation timed out")]
    Timeout,

    /// Underlying ldap3 error.
    #[error("LDAP error: {0}")]
    Ldap3(#[from] ldap3::LdapError),
}

impl LdapError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a search error.
    #[must_use]
    pub fn search(msg: impl Into<String>) -> Self {
        Self::Search(msg.into())
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Checks if this is a transport error.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Bind(_) | Self::Search(_) | Self::Timeout | Self::Ldap3(_)
        )
    }
}

/// Result type for LDAP operations.
pub type LdapResult<T> = Result<T, LdapError>;

impl From<LdapError> for sr_core::Error {
    fn from(err: LdapError) -> Self {
        match err {
            LdapError::Configuration(msg) | LdapError::InvalidDn(msg) => {
                Self::ConfigurationInvalid(msg)
            }
            LdapError::InsecureProtocol => Self::ConfigurationInvalid(err.to_string()),
            LdapError::NotFound(name) => Self::NotFound(name),
            LdapError::Ambiguous { .. } => Self::AmbiguousResult(err.to_string()),
            LdapError::Connection(_)
            | LdapError::Bind(_)
            | LdapError::Search(_)
            | LdapError::Timeout
            | LdapError::Ldap3(_) => Self::Io(err.to_string()),
        }
    }
}
