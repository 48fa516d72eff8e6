//! Error taxonomy for security realms.
//!
//! Messages name the failing realm, mechanism or directory entry so an
//! operator can act on them. They never carry passwords or bind credentials,
//! and authentication failures stay generic to prevent user enumeration.

use thiserror::Error;

/// Result type alias using the realm error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for realm operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A realm or mechanism configuration violates an invariant
    /// (mechanism cardinality, missing required attribute, bad filter).
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// No directory entry matched.
    #[error("not found: {0}")]
    NotFound(String),

    /// More than one directory entry matched where exactly one was required.
    #[error("ambiguous result: {0}")]
    AmbiguousResult(String),

    /// Transport or network failure.
    #[error("I/O failure: {0}")]
    Io(String),

    /// A plug-in module or plug-in name could not be resolved.
    #[error("plug-in not found: {0}")]
    PluginNotFound(String),

    /// A plug-in was found but does not provide the capability its mount
    /// point requires.
    #[error("plug-in '{name}' does not implement the required {capability} capability")]
    PluginNotConforming {
        /// Plug-in name.
        name: String,
        /// Capability the mount point requires.
        capability: &'static str,
    },

    /// A mechanism was invoked before its setup completed.
    #[error("mechanism not configured: {0}")]
    NotReady(String),

    /// Credentials were rejected.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The registry lookup guard refused access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl Error {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigurationInvalid(msg.into())
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Creates an I/O error.
    #[must_use]
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Creates a not-ready error.
    #[must_use]
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    /// Whether the caller may simply retry later.
    ///
    /// Only [`Error::NotReady`] qualifies; it must never be treated as a
    /// rejected credential.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotReady(_))
    }

    /// Whether this error is reported at configuration time.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationInvalid(_)
                | Self::PluginNotFound(_)
                | Self::PluginNotConforming { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
